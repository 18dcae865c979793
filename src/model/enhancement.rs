use serde::{Deserialize, Serialize};

pub const MAX_ASCENSION: u8 = 4;
pub const MAX_SKILL_LEVEL: u8 = 10;
pub const SKILL_SLOTS: [u8; 3] = [1, 2, 3];

/// Levels of the three skill slots of one servant. A `None` slot has not been
/// unlocked yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillLevels {
    #[serde(rename = "1", default, skip_serializing_if = "Option::is_none")]
    pub slot_1: Option<u8>,
    #[serde(rename = "2", default, skip_serializing_if = "Option::is_none")]
    pub slot_2: Option<u8>,
    #[serde(rename = "3", default, skip_serializing_if = "Option::is_none")]
    pub slot_3: Option<u8>,
}

impl SkillLevels {
    pub fn new(slot_1: Option<u8>, slot_2: Option<u8>, slot_3: Option<u8>) -> Self {
        Self {
            slot_1,
            slot_2,
            slot_3,
        }
    }

    pub fn uniform(level: u8) -> Self {
        Self::new(Some(level), Some(level), Some(level))
    }

    /// Slot numbers outside `1..=3` read as absent.
    pub fn get(&self, slot: u8) -> Option<u8> {
        match slot {
            1 => self.slot_1,
            2 => self.slot_2,
            3 => self.slot_3,
            _ => None,
        }
    }

    pub fn set(&mut self, slot: u8, level: Option<u8>) {
        match slot {
            1 => self.slot_1 = level,
            2 => self.slot_2 = level,
            3 => self.slot_3 = level,
            _ => {}
        }
    }

    /// Level of the slot for cost purposes; an absent slot counts as 0.
    pub fn level_or_zero(&self, slot: u8) -> u8 {
        self.get(slot).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, Option<u8>)> + '_ {
        SKILL_SLOTS.iter().map(move |&slot| (slot, self.get(slot)))
    }
}

/// Enhancement levels of a servant, either as currently owned or as planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnhancementState {
    pub level: u32,
    pub ascension: u8,
    pub skills: SkillLevels,
    #[serde(default)]
    pub append_skills: SkillLevels,
}

impl EnhancementState {
    pub fn new(level: u32, ascension: u8, skill_1: u8) -> Self {
        Self {
            level,
            ascension: ascension.min(MAX_ASCENSION),
            skills: SkillLevels::new(Some(skill_1), None, None),
            append_skills: SkillLevels::default(),
        }
    }

    pub fn with_skills(mut self, skills: SkillLevels) -> Self {
        self.skills = skills;
        self
    }

    pub fn with_append_skills(mut self, append_skills: SkillLevels) -> Self {
        self.append_skills = append_skills;
        self
    }
}

impl Default for EnhancementState {
    fn default() -> Self {
        Self::new(1, 0, 1)
    }
}
