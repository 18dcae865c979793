use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::requirements::RequirementAccumulator;
use super::servant::{compute_servant_requirements, ComputeOptions, ServantSnapshot, ServantTarget};
use crate::catalog::{Catalog, GameServant};
use crate::model::{
    CostumeId, EnhancementState, InstanceId, MasterServant, PlanServant, SkillLevels, SKILL_SLOTS,
};

/// State reached by raising every enabled field of `current` up to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ratchet {
    pub state: EnhancementState,
    pub unlocked_costumes: BTreeSet<CostumeId>,
    pub changed: bool,
}

/// Raises (never lowers) each enabled field of `current` to its target.
pub fn ratchet_state(
    servant: &GameServant,
    current: &EnhancementState,
    current_costumes: &BTreeSet<CostumeId>,
    target: &EnhancementState,
    target_costumes: Option<&BTreeSet<CostumeId>>,
    options: &ComputeOptions,
) -> Ratchet {
    let mut state = *current;
    let mut changed = false;

    if options.include_ascensions {
        if state.level < target.level {
            state.level = target.level;
            changed = true;
        }
        if state.ascension < target.ascension {
            state.ascension = target.ascension;
            changed = true;
        }
    }
    if options.include_skills {
        changed |= raise_skills(&mut state.skills, &target.skills);
    }
    if options.include_append_skills {
        changed |= raise_skills(&mut state.append_skills, &target.append_skills);
    }

    let mut unlocked_costumes = BTreeSet::new();
    if options.include_costumes {
        for costume_id in servant.costumes.keys() {
            if current_costumes.contains(costume_id) {
                continue;
            }
            if target_costumes.map_or(true, |target| target.contains(costume_id)) {
                unlocked_costumes.insert(*costume_id);
            }
        }
    }
    changed |= !unlocked_costumes.is_empty();

    Ratchet {
        state,
        unlocked_costumes,
        changed,
    }
}

fn raise_skills(current: &mut SkillLevels, target: &SkillLevels) -> bool {
    let mut changed = false;
    for slot in SKILL_SLOTS {
        if let Some(level) = target.get(slot) {
            if current.level_or_zero(slot) < level {
                current.set(slot, Some(level));
                changed = true;
            }
        }
    }
    changed
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentResult {
    pub instance_id: InstanceId,
    /// New current state for the servant.
    pub update: EnhancementState,
    pub unlocked_costumes: BTreeSet<CostumeId>,
    /// Cost of exactly the raised fields.
    pub requirements: RequirementAccumulator,
}

/// Completes a plan servant's targets. Returns `None` when nothing needs
/// raising, which callers treat as "skip inventory and list updates".
pub fn fulfill_servant(
    catalog: &Catalog,
    servant: &GameServant,
    master: &MasterServant,
    plan_servant: &PlanServant,
    current_costumes: &BTreeSet<CostumeId>,
    target_costumes: Option<&BTreeSet<CostumeId>>,
    options: &ComputeOptions,
) -> Option<FulfillmentResult> {
    let options = options.restrict_to_servant(&plan_servant.enabled);
    if !options.includes_any() {
        return None;
    }

    let ratchet = ratchet_state(
        servant,
        &master.state,
        current_costumes,
        &plan_servant.target,
        target_costumes,
        &options,
    );
    if !ratchet.changed {
        return None;
    }

    let requirements = compute_servant_requirements(
        catalog,
        servant,
        ServantSnapshot {
            state: &master.state,
            costumes: current_costumes,
        },
        ServantTarget {
            state: &ratchet.state,
            costumes: Some(&ratchet.unlocked_costumes),
        },
        &options,
    );

    Some(FulfillmentResult {
        instance_id: master.instance_id,
        update: ratchet.state,
        unlocked_costumes: ratchet.unlocked_costumes,
        requirements,
    })
}
