use anyhow::Context;
use async_trait::async_trait;

use super::{accounts, plans, Pool};
use crate::model::{AccountId, MasterAccount, Plan, PlanId};
use crate::session::{AccountStore, PlanStore};

/// Session store backed by the SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn load_account(&self, account_id: AccountId) -> anyhow::Result<MasterAccount> {
        accounts::get_account(&self.pool, account_id)
            .await?
            .with_context(|| format!("account {} not found", account_id))
    }

    async fn save_account(&self, account: &MasterAccount) -> anyhow::Result<()> {
        accounts::save_account(&self.pool, account)
            .await
            .with_context(|| format!("failed to save account {}", account.account_id))
    }
}

#[async_trait]
impl PlanStore for SqliteStore {
    async fn load_plan(&self, plan_id: PlanId) -> anyhow::Result<Plan> {
        plans::get_plan(&self.pool, plan_id)
            .await?
            .with_context(|| format!("plan {} not found", plan_id))
    }

    async fn save_plan(&self, plan: &Plan) -> anyhow::Result<()> {
        plans::save_plan(&self.pool, plan)
            .await
            .with_context(|| format!("failed to save plan {}", plan.plan_id))
    }

    async fn load_previous_plans(&self, plan_id: PlanId) -> anyhow::Result<Vec<Plan>> {
        plans::get_previous_plans(&self.pool, plan_id).await
    }
}
