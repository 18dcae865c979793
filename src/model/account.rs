use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{AccountId, CostumeId, EnhancementState, GameServantId, InstanceId, ItemId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountResources {
    pub items: BTreeMap<ItemId, u64>,
    pub qp: u64,
}

impl AccountResources {
    pub fn quantity(&self, item_id: ItemId) -> u64 {
        self.items.get(&item_id).copied().unwrap_or(0)
    }
}

/// An owned servant instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterServant {
    pub instance_id: InstanceId,
    pub game_id: GameServantId,
    pub summon_date: Option<NaiveDate>,
    pub state: EnhancementState,
}

/// Snapshot of an account as the planner consumes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterAccount {
    pub account_id: AccountId,
    pub name: String,
    pub resources: AccountResources,
    pub servants: Vec<MasterServant>,
    pub costumes: BTreeSet<CostumeId>,
    pub bond_levels: BTreeMap<GameServantId, u8>,
    /// Next instance id to hand out. Never decreases, so ids of deleted
    /// servants are never reused.
    pub next_instance_id: InstanceId,
}

impl MasterAccount {
    pub fn servant(&self, instance_id: InstanceId) -> Option<&MasterServant> {
        self.servants.iter().find(|s| s.instance_id == instance_id)
    }

    pub fn servant_map(&self) -> BTreeMap<InstanceId, &MasterServant> {
        self.servants.iter().map(|s| (s.instance_id, s)).collect()
    }

    pub fn bond_level(&self, game_id: GameServantId) -> Option<u8> {
        self.bond_levels.get(&game_id).copied()
    }

    /// Lowest id that is safe to assign next, considering both the stored
    /// counter and the ids already present.
    pub fn min_next_instance_id(&self) -> InstanceId {
        let max_present = self
            .servants
            .iter()
            .map(|s| s.instance_id)
            .max()
            .unwrap_or(0);
        self.next_instance_id.max(max_present + 1).max(1)
    }
}
