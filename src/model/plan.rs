use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    AccountId, CostumeId, EnhancementState, InstanceId, ItemId, MasterServant, PlanId, SkillLevels,
};

/// Tri-state flag used by batch edits. `Indeterminate` means the selection
/// holds mixed values and the edit must leave each entry untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnabledState {
    Enabled,
    Disabled,
    #[default]
    Indeterminate,
}

impl EnabledState {
    pub fn resolve(self, current: bool) -> bool {
        match self {
            EnabledState::Enabled => true,
            EnabledState::Disabled => false,
            EnabledState::Indeterminate => current,
        }
    }

    /// Collapses a selection of flags into one state.
    pub fn from_values<I: IntoIterator<Item = bool>>(values: I) -> Self {
        let mut result = None;
        for value in values {
            match result {
                None => result = Some(value),
                Some(prev) if prev != value => return EnabledState::Indeterminate,
                Some(_) => {}
            }
        }
        match result {
            Some(true) => EnabledState::Enabled,
            Some(false) => EnabledState::Disabled,
            None => EnabledState::Indeterminate,
        }
    }
}

impl From<bool> for EnabledState {
    fn from(value: bool) -> Self {
        if value {
            EnabledState::Enabled
        } else {
            EnabledState::Disabled
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanEnabled {
    pub ascensions: bool,
    pub skills: bool,
    pub append_skills: bool,
    pub costumes: bool,
}

impl Default for PlanEnabled {
    fn default() -> Self {
        Self {
            ascensions: true,
            skills: true,
            append_skills: true,
            costumes: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanServantEnabled {
    pub servant: bool,
    pub ascensions: bool,
    pub skills: bool,
    pub append_skills: bool,
    pub costumes: bool,
}

impl Default for PlanServantEnabled {
    fn default() -> Self {
        Self {
            servant: true,
            ascensions: true,
            skills: true,
            append_skills: true,
            costumes: true,
        }
    }
}

/// One servant's planned target inside a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanServant {
    pub instance_id: InstanceId,
    pub enabled: PlanServantEnabled,
    pub target: EnhancementState,
}

impl PlanServant {
    /// New plan entry whose target starts at the servant's current state.
    pub fn from_master(servant: &MasterServant) -> Self {
        Self {
            instance_id: servant.instance_id,
            enabled: PlanServantEnabled::default(),
            target: servant.state,
        }
    }
}

/// Batch edit applied to several plan servants at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanServantEdit {
    pub servant: EnabledState,
    pub ascensions: EnabledState,
    pub skills: EnabledState,
    pub append_skills: EnabledState,
    pub costumes: EnabledState,
    pub level: Option<u32>,
    pub ascension: Option<u8>,
    pub skill_levels: BTreeMap<u8, u8>,
    pub append_skill_levels: BTreeMap<u8, u8>,
}

impl PlanServantEdit {
    pub fn apply_to(&self, servant: &mut PlanServant) {
        let enabled = &mut servant.enabled;
        enabled.servant = self.servant.resolve(enabled.servant);
        enabled.ascensions = self.ascensions.resolve(enabled.ascensions);
        enabled.skills = self.skills.resolve(enabled.skills);
        enabled.append_skills = self.append_skills.resolve(enabled.append_skills);
        enabled.costumes = self.costumes.resolve(enabled.costumes);

        if let Some(level) = self.level {
            servant.target.level = level;
        }
        if let Some(ascension) = self.ascension {
            servant.target.ascension = ascension.min(super::MAX_ASCENSION);
        }
        apply_slot_levels(&mut servant.target.skills, &self.skill_levels);
        apply_slot_levels(&mut servant.target.append_skills, &self.append_skill_levels);
    }
}

fn apply_slot_levels(skills: &mut SkillLevels, levels: &BTreeMap<u8, u8>) {
    for (&slot, &level) in levels {
        skills.set(slot, Some(level.min(super::MAX_SKILL_LEVEL)));
    }
}

/// Resources expected to arrive later, counted against a plan's deficit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingResource {
    pub start_date: Option<NaiveDate>,
    pub items: BTreeMap<ItemId, u64>,
    pub qp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: PlanId,
    pub account_id: AccountId,
    pub name: String,
    pub description: Option<String>,
    pub group_id: Option<i64>,
    pub enabled: PlanEnabled,
    pub servants: Vec<PlanServant>,
    pub costumes: BTreeSet<CostumeId>,
    pub upcoming_resources: Vec<UpcomingResource>,
}

impl Plan {
    pub fn servant(&self, instance_id: InstanceId) -> Option<&PlanServant> {
        self.servants.iter().find(|s| s.instance_id == instance_id)
    }
}
