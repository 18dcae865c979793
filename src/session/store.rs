//! Store ports used by edit sessions to load and persist snapshots.

use async_trait::async_trait;

use crate::model::{AccountId, MasterAccount, Plan, PlanId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn load_account(&self, account_id: AccountId) -> anyhow::Result<MasterAccount>;
    async fn save_account(&self, account: &MasterAccount) -> anyhow::Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn load_plan(&self, plan_id: PlanId) -> anyhow::Result<Plan>;
    async fn save_plan(&self, plan: &Plan) -> anyhow::Result<()>;
    /// Plans chained before `plan_id`, earliest first.
    async fn load_previous_plans(&self, plan_id: PlanId) -> anyhow::Result<Vec<Plan>>;
}
