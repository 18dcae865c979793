pub mod account;
pub mod enhancement;
pub mod plan;

pub use account::{AccountResources, MasterAccount, MasterServant};
pub use enhancement::{EnhancementState, SkillLevels, MAX_ASCENSION, MAX_SKILL_LEVEL, SKILL_SLOTS};
pub use plan::{
    EnabledState, Plan, PlanEnabled, PlanServant, PlanServantEdit, PlanServantEnabled,
    UpcomingResource,
};

pub type AccountId = i64;
pub type CostumeId = i64;
pub type GameServantId = i64;
pub type InstanceId = i64;
pub type ItemId = i64;
pub type PlanId = i64;
