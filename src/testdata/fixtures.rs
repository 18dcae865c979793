use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lazy_static::lazy_static;

use crate::catalog::{Catalog, GameCostume, GameServant, GrailCost, MaterialCost};
use crate::model::{
    EnhancementState, GameServantId, InstanceId, ItemId, MasterAccount, MasterServant, Plan,
    PlanServant, PlanServantEnabled,
};

pub const SABER_ID: GameServantId = 100;
pub const ARCHER_ID: GameServantId = 200;

pub const ITEM_A: ItemId = 6001;
pub const ITEM_B: ItemId = 6002;
pub const ITEM_COSTUME: ItemId = 6003;
pub const ITEM_C: ItemId = 6501;
pub const ITEM_D: ItemId = 6601;
pub const LORE_ITEM: ItemId = 6999;
pub const GRAIL_ITEM_ID: ItemId = crate::catalog::DEFAULT_GRAIL_ITEM_ID;

pub const COSTUME_1: i64 = 800101;
pub const COSTUME_2: i64 = 800102;

pub const SKILL_STEP_QP: u64 = 100_000;
pub const APPEND_STEP_QP: u64 = 200_000;

lazy_static! {
    static ref CATALOG: Arc<Catalog> = Arc::new(build_catalog());
}

pub fn material(items: &[(ItemId, u64)], qp: u64) -> MaterialCost {
    MaterialCost {
        materials: items.iter().copied().collect(),
        qp,
    }
}

fn skill_table(item: ItemId, qp: u64, lore: bool) -> BTreeMap<u8, MaterialCost> {
    (1..=9)
        .map(|step| {
            let cost = if lore && step == 9 {
                material(&[(item, 2), (LORE_ITEM, 1)], qp)
            } else {
                material(&[(item, 2)], qp)
            };
            (step, cost)
        })
        .collect()
}

fn saber() -> GameServant {
    GameServant {
        id: SABER_ID,
        name: "Saber".to_string(),
        rarity: 5,
        max_level: 90,
        ascension_materials: BTreeMap::from([
            (1, material(&[(ITEM_A, 3)], 50_000)),
            (2, material(&[(ITEM_A, 5)], 150_000)),
            (3, material(&[(ITEM_B, 5)], 500_000)),
            (4, material(&[(ITEM_B, 7)], 1_500_000)),
        ]),
        skill_materials: skill_table(ITEM_C, SKILL_STEP_QP, true),
        append_skill_materials: (1..=9)
            .map(|step| (step, material(&[(ITEM_D, 3)], APPEND_STEP_QP)))
            .collect(),
        costumes: BTreeMap::from([
            (
                COSTUME_1,
                GameCostume {
                    name: "Summer".to_string(),
                    materials: material(&[(ITEM_COSTUME, 5)], 3_000_000),
                },
            ),
            (
                COSTUME_2,
                GameCostume {
                    name: "Winter".to_string(),
                    materials: material(&[(ITEM_COSTUME, 8)], 3_000_000),
                },
            ),
        ]),
    }
}

fn archer() -> GameServant {
    GameServant {
        id: ARCHER_ID,
        name: "Archer".to_string(),
        rarity: 4,
        max_level: 80,
        ascension_materials: BTreeMap::from([
            (1, material(&[(ITEM_A, 4)], 30_000)),
            (2, material(&[(ITEM_A, 8)], 100_000)),
            (3, material(&[(ITEM_B, 4)], 300_000)),
            (4, material(&[(ITEM_B, 8)], 900_000)),
        ]),
        skill_materials: skill_table(ITEM_C, SKILL_STEP_QP, false),
        append_skill_materials: BTreeMap::new(),
        costumes: BTreeMap::new(),
    }
}

fn grail_table(first: u32, first_qp: u64) -> Vec<GrailCost> {
    let mut table = vec![GrailCost {
        level: first,
        qp: first_qp,
    }];
    let mut qp = first_qp;
    let mut level = first.max(92);
    if level == first {
        level += 2;
    }
    while level <= 120 {
        qp += 1_000_000;
        table.push(GrailCost { level, qp });
        level += 2;
    }
    table
}

fn build_catalog() -> Catalog {
    Catalog::new(
        vec![saber(), archer()],
        BTreeMap::from([(5, grail_table(92, 4_000_000)), (4, grail_table(90, 3_000_000))]),
    )
}

pub fn catalog() -> Arc<Catalog> {
    Arc::clone(&CATALOG)
}

pub fn master_servant(
    instance_id: InstanceId,
    game_id: GameServantId,
    state: EnhancementState,
) -> MasterServant {
    MasterServant {
        instance_id,
        game_id,
        summon_date: None,
        state,
    }
}

/// Account 1 owning a fresh Saber (instance 1) and a half-built Archer
/// (instance 2).
pub fn account() -> MasterAccount {
    MasterAccount {
        account_id: 1,
        name: "Main".to_string(),
        resources: crate::model::AccountResources {
            items: BTreeMap::from([(ITEM_A, 10), (ITEM_B, 3), (ITEM_C, 40)]),
            qp: 5_000_000,
        },
        servants: vec![
            master_servant(1, SABER_ID, EnhancementState::new(1, 0, 1)),
            master_servant(2, ARCHER_ID, EnhancementState::new(60, 2, 4)),
        ],
        costumes: BTreeSet::new(),
        bond_levels: BTreeMap::from([(SABER_ID, 5)]),
        next_instance_id: 3,
    }
}

pub fn plan_servant(instance_id: InstanceId, target: EnhancementState) -> PlanServant {
    PlanServant {
        instance_id,
        enabled: PlanServantEnabled::default(),
        target,
    }
}

pub fn plan(plan_id: i64, servants: Vec<PlanServant>) -> Plan {
    Plan {
        plan_id,
        account_id: 1,
        name: format!("Plan {}", plan_id),
        servants,
        ..Default::default()
    }
}
