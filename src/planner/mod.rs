//! Requirement computation: per-servant costs, chained plan totals,
//! inventory deficits and plan completion.

pub mod aggregate;
pub mod deficit;
pub mod fulfillment;
pub mod requirements;
pub mod servant;

pub use aggregate::{compute_plan_requirements, PlanRequirements, PlanRequirementsResult};
pub use deficit::{
    compute_deficit, compute_plan_deficits, sum_upcoming, DeficitResult, PlanDeficits,
};
pub use fulfillment::{fulfill_servant, ratchet_state, FulfillmentResult, Ratchet};
pub use requirements::{EnhancementCategory, ItemRequirements, RequirementAccumulator};
pub use servant::{
    compute_account_requirements, compute_servant_max_requirements, compute_servant_requirements,
    max_target, AccountRequirements, ComputeOptions, ServantSnapshot, ServantTarget,
    LORE_SKILL_LEVEL,
};
