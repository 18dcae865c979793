use std::sync::Arc;

use futures_util::future;

use super::{AccountEditSession, AccountStore, PlanEditSession, PlanStore, RemoteChangeOutcome};
use crate::catalog::Catalog;
use crate::error::{SessionError, SessionResult};
use crate::events::{DataType, DataUpdated, EventBus};
use crate::model::{AccountId, InstanceId, PlanId};
use crate::planner::{fulfill_servant, ComputeOptions, FulfillmentResult};

/// Result of persisting both sessions. `None` means the entity was clean and
/// no request was made.
#[derive(Debug, Default)]
pub struct PersistAllOutcome {
    pub account: Option<SessionResult<()>>,
    pub plan: Option<SessionResult<()>>,
}

impl PersistAllOutcome {
    pub fn is_ok(&self) -> bool {
        self.account.as_ref().map_or(true, |r| r.is_ok())
            && self.plan.as_ref().map_or(true, |r| r.is_ok())
    }
}

/// An account session and one of its plans, kept in sync with each other.
pub struct PlannerWorkspace {
    catalog: Arc<Catalog>,
    account: AccountEditSession,
    plan: PlanEditSession,
}

impl PlannerWorkspace {
    pub fn new(catalog: Arc<Catalog>, account: AccountEditSession, plan: PlanEditSession) -> Self {
        plan.set_account(Arc::new(account.snapshot()));
        Self {
            catalog,
            account,
            plan,
        }
    }

    pub async fn open(
        account_store: Arc<dyn AccountStore>,
        plan_store: Arc<dyn PlanStore>,
        catalog: Arc<Catalog>,
        events: Arc<EventBus>,
        account_id: AccountId,
        plan_id: PlanId,
        options: ComputeOptions,
    ) -> SessionResult<Self> {
        let account = AccountEditSession::load(account_store, Arc::clone(&events), account_id).await?;
        let plan = PlanEditSession::load(
            plan_store,
            Arc::clone(&catalog),
            events,
            plan_id,
            Arc::new(account.snapshot()),
            options,
        )
        .await?;
        Ok(Self {
            catalog,
            account,
            plan,
        })
    }

    pub fn account(&self) -> &AccountEditSession {
        &self.account
    }

    pub fn plan(&self) -> &PlanEditSession {
        &self.plan
    }

    /// Pushes the account edit copy into the plan session. Call after editing
    /// the account directly.
    pub fn sync_account(&self) {
        self.plan.set_account(Arc::new(self.account.snapshot()));
    }

    /// Marks one plan servant as done: raises the account servant to its
    /// targets, unlocks costumes, deducts the materials spent and drops the
    /// servant from the plan. Returns `None` and changes nothing when the
    /// targets are already met.
    pub fn complete_servant(
        &self,
        instance_id: InstanceId,
    ) -> SessionResult<Option<FulfillmentResult>> {
        let plan = self.plan.edit();
        let plan_servant = plan
            .servant(instance_id)
            .ok_or(SessionError::UnknownInstance(instance_id))?;
        let account = self.account.edit();
        let master = account
            .servant(instance_id)
            .ok_or(SessionError::UnknownInstance(instance_id))?;
        let servant = self.catalog.servant(master.game_id).ok_or_else(|| {
            SessionError::Validation(format!(
                "game servant {} is not in the catalog",
                master.game_id
            ))
        })?;

        let options = self.plan.options().restrict_to_plan(&plan.enabled);
        let Some(result) = fulfill_servant(
            &self.catalog,
            servant,
            master,
            plan_servant,
            &account.costumes,
            Some(&plan.costumes),
            &options,
        ) else {
            tracing::debug!("Servant {} already meets its plan targets", instance_id);
            return Ok(None);
        };

        self.account
            .update_servant_state(instance_id, result.update)?;
        self.account
            .unlock_costumes(result.unlocked_costumes.iter().copied());
        self.account.deduct_requirements(&result.requirements);
        self.plan.remove_servants(&[instance_id]);
        self.sync_account();

        Ok(Some(result))
    }

    /// Persists every dirty session concurrently. Each session's dirty state
    /// is settled by its own request only.
    pub async fn persist_all(&self) -> PersistAllOutcome {
        let account_dirty = self.account.is_dirty();
        let plan_dirty = self.plan.is_dirty();

        let (account, plan) = future::join(
            async {
                if account_dirty {
                    Some(self.account.persist().await)
                } else {
                    None
                }
            },
            async {
                if plan_dirty {
                    Some(self.plan.persist().await)
                } else {
                    None
                }
            },
        )
        .await;

        PersistAllOutcome { account, plan }
    }

    /// Routes a change notification to the matching session.
    pub async fn handle_remote_change(
        &self,
        event: &DataUpdated,
    ) -> SessionResult<RemoteChangeOutcome> {
        match event.data_type {
            DataType::Account => {
                let outcome = self.account.handle_remote_change(event).await?;
                if outcome == RemoteChangeOutcome::Reloaded {
                    self.sync_account();
                }
                Ok(outcome)
            }
            DataType::Plan => self.plan.handle_remote_change(event).await,
        }
    }

    /// Discards edits in both sessions.
    pub fn revert_all(&self) {
        self.account.revert();
        self.plan.revert();
        self.sync_account();
    }
}
