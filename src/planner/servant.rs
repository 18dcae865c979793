use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::requirements::{EnhancementCategory, RequirementAccumulator};
use crate::catalog::{Catalog, GameServant, MaterialCost};
use crate::model::{
    CostumeId, EnhancementState, InstanceId, MasterAccount, PlanEnabled, PlanServantEnabled,
    SkillLevels, MAX_ASCENSION, MAX_SKILL_LEVEL, SKILL_SLOTS,
};

/// Skill step that consumes lores (9 -> 10).
pub const LORE_SKILL_LEVEL: u8 = MAX_SKILL_LEVEL - 1;

/// Which categories a computation counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeOptions {
    pub include_ascensions: bool,
    pub include_skills: bool,
    pub include_append_skills: bool,
    pub include_costumes: bool,
    pub exclude_lores: bool,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            include_ascensions: true,
            include_skills: true,
            include_append_skills: true,
            include_costumes: true,
            exclude_lores: false,
        }
    }
}

impl ComputeOptions {
    pub fn none() -> Self {
        Self {
            include_ascensions: false,
            include_skills: false,
            include_append_skills: false,
            include_costumes: false,
            exclude_lores: false,
        }
    }

    pub fn restrict_to_plan(&self, enabled: &PlanEnabled) -> Self {
        Self {
            include_ascensions: self.include_ascensions && enabled.ascensions,
            include_skills: self.include_skills && enabled.skills,
            include_append_skills: self.include_append_skills && enabled.append_skills,
            include_costumes: self.include_costumes && enabled.costumes,
            exclude_lores: self.exclude_lores,
        }
    }

    pub fn restrict_to_servant(&self, enabled: &PlanServantEnabled) -> Self {
        if !enabled.servant {
            return Self {
                exclude_lores: self.exclude_lores,
                ..Self::none()
            };
        }
        Self {
            include_ascensions: self.include_ascensions && enabled.ascensions,
            include_skills: self.include_skills && enabled.skills,
            include_append_skills: self.include_append_skills && enabled.append_skills,
            include_costumes: self.include_costumes && enabled.costumes,
            exclude_lores: self.exclude_lores,
        }
    }

    pub fn includes_any(&self) -> bool {
        self.include_ascensions
            || self.include_skills
            || self.include_append_skills
            || self.include_costumes
    }
}

/// Where a servant stands now.
#[derive(Debug, Clone, Copy)]
pub struct ServantSnapshot<'a> {
    pub state: &'a EnhancementState,
    pub costumes: &'a BTreeSet<CostumeId>,
}

/// Where a servant should end up. `costumes: None` targets every costume the
/// servant has.
#[derive(Debug, Clone, Copy)]
pub struct ServantTarget<'a> {
    pub state: &'a EnhancementState,
    pub costumes: Option<&'a BTreeSet<CostumeId>>,
}

/// Material cost of moving one servant from `current` to `target`. Targets
/// below the current value cost nothing; the result is never negative.
pub fn compute_servant_requirements(
    catalog: &Catalog,
    servant: &GameServant,
    current: ServantSnapshot<'_>,
    target: ServantTarget<'_>,
    options: &ComputeOptions,
) -> RequirementAccumulator {
    let mut acc = RequirementAccumulator::new();

    if options.include_skills {
        add_skill_requirements(
            &mut acc,
            EnhancementCategory::Skill,
            &servant.skill_materials,
            &current.state.skills,
            &target.state.skills,
            options.exclude_lores,
        );
    }

    if options.include_append_skills {
        add_skill_requirements(
            &mut acc,
            EnhancementCategory::AppendSkill,
            &servant.append_skill_materials,
            &current.state.append_skills,
            &target.state.append_skills,
            options.exclude_lores,
        );
    }

    if options.include_ascensions {
        add_ascension_requirements(&mut acc, catalog, servant, current.state, target.state);
    }

    if options.include_costumes {
        add_costume_requirements(&mut acc, servant, current.costumes, target.costumes);
    }

    acc
}

fn add_skill_requirements(
    acc: &mut RequirementAccumulator,
    category: EnhancementCategory,
    materials: &BTreeMap<u8, MaterialCost>,
    current: &SkillLevels,
    target: &SkillLevels,
    exclude_lores: bool,
) {
    for (&step, cost) in materials {
        if exclude_lores && step == LORE_SKILL_LEVEL {
            continue;
        }
        let slots = SKILL_SLOTS
            .iter()
            .filter(|&&slot| {
                let from = current.level_or_zero(slot);
                let to = target.level_or_zero(slot);
                from <= step && step < to
            })
            .count() as u64;
        acc.add_cost(category, cost, slots);
    }
}

fn add_ascension_requirements(
    acc: &mut RequirementAccumulator,
    catalog: &Catalog,
    servant: &GameServant,
    current: &EnhancementState,
    target: &EnhancementState,
) {
    for (&tier, cost) in &servant.ascension_materials {
        if current.ascension < tier && tier <= target.ascension {
            acc.add_cost(EnhancementCategory::Ascension, cost, 1);
        }
    }

    if target.level <= servant.max_level || target.level <= current.level {
        return;
    }

    // A grail is needed for every threshold above the current level, up to and
    // including the first threshold that reaches the target.
    let grail_item_id = catalog.grail_item_id();
    for grail in catalog.grail_costs(servant.rarity) {
        if grail.level <= current.level {
            continue;
        }
        acc.add_item(EnhancementCategory::Ascension, grail_item_id, 1);
        acc.add_currency(grail.qp);
        if grail.level >= target.level {
            break;
        }
    }
}

fn add_costume_requirements(
    acc: &mut RequirementAccumulator,
    servant: &GameServant,
    current: &BTreeSet<CostumeId>,
    target: Option<&BTreeSet<CostumeId>>,
) {
    for (costume_id, costume) in &servant.costumes {
        if current.contains(costume_id) {
            continue;
        }
        if let Some(target) = target {
            if !target.contains(costume_id) {
                continue;
            }
        }
        acc.add_cost(EnhancementCategory::Costume, &costume.materials, 1);
    }
}

/// Fully enhanced state for a servant: final ascension, every skill and append
/// skill at max. Levels above the natural cap are kept, never lowered.
pub fn max_target(servant: &GameServant, current: &EnhancementState) -> EnhancementState {
    EnhancementState {
        level: current.level.max(servant.max_level),
        ascension: MAX_ASCENSION,
        skills: SkillLevels::uniform(MAX_SKILL_LEVEL),
        append_skills: SkillLevels::uniform(MAX_SKILL_LEVEL),
    }
}

pub fn compute_servant_max_requirements(
    catalog: &Catalog,
    servant: &GameServant,
    current: ServantSnapshot<'_>,
    options: &ComputeOptions,
) -> RequirementAccumulator {
    let target = max_target(servant, current.state);
    compute_servant_requirements(
        catalog,
        servant,
        current,
        ServantTarget {
            state: &target,
            costumes: None,
        },
        options,
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRequirements {
    pub total: RequirementAccumulator,
    pub servants: BTreeMap<InstanceId, RequirementAccumulator>,
}

/// Cost of maxing out every owned servant.
pub fn compute_account_requirements(
    catalog: &Catalog,
    account: &MasterAccount,
    options: &ComputeOptions,
) -> AccountRequirements {
    let mut result = AccountRequirements::default();
    for master in &account.servants {
        let Some(servant) = catalog.servant(master.game_id) else {
            tracing::warn!(
                "Skipping servant instance {}: game servant {} not in catalog",
                master.instance_id,
                master.game_id
            );
            continue;
        };
        let requirements = compute_servant_max_requirements(
            catalog,
            servant,
            ServantSnapshot {
                state: &master.state,
                costumes: &account.costumes,
            },
            options,
        );
        result.total.merge(&requirements);
        result.servants.insert(master.instance_id, requirements);
    }
    result
}
