use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    check_permutation, copy_on_write, lock, mark, PlanStore, RemoteChangeOutcome, RequestFlag,
};
use crate::catalog::Catalog;
use crate::error::{SessionError, SessionResult};
use crate::events::{DataType, DataUpdated, EventBus, RequirementsUpdated};
use crate::model::{
    AccountId, CostumeId, InstanceId, MasterAccount, Plan, PlanEnabled, PlanId, PlanServant,
    PlanServantEdit, UpcomingResource,
};
use crate::planner::{
    compute_plan_deficits, compute_plan_requirements, ComputeOptions, PlanDeficits,
    PlanRequirementsResult,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInfo {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEditData {
    pub info: Arc<PlanInfo>,
    pub enabled: Arc<PlanEnabled>,
    pub servants: Arc<Vec<PlanServant>>,
    pub costumes: Arc<BTreeSet<CostumeId>>,
    pub upcoming_resources: Arc<Vec<UpcomingResource>>,
}

impl PlanEditData {
    fn from_plan(plan: &Plan) -> Self {
        Self {
            info: Arc::new(PlanInfo {
                name: plan.name.clone(),
                description: plan.description.clone(),
            }),
            enabled: Arc::new(plan.enabled),
            servants: Arc::new(plan.servants.clone()),
            costumes: Arc::new(plan.costumes.clone()),
            upcoming_resources: Arc::new(plan.upcoming_resources.clone()),
        }
    }

    pub fn servant(&self, instance_id: InstanceId) -> Option<&PlanServant> {
        self.servants.iter().find(|s| s.instance_id == instance_id)
    }

    fn servant_ids(&self) -> Vec<InstanceId> {
        self.servants.iter().map(|s| s.instance_id).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDirtyState {
    pub info: bool,
    pub enabled: bool,
    pub servants: BTreeSet<InstanceId>,
    pub servant_order: bool,
    pub costumes: bool,
    pub upcoming_resources: bool,
}

impl PlanDirtyState {
    pub fn is_dirty(&self) -> bool {
        self.info
            || self.enabled
            || !self.servants.is_empty()
            || self.servant_order
            || self.costumes
            || self.upcoming_resources
    }
}

#[derive(Debug)]
struct PlanState {
    account_id: AccountId,
    group_id: Option<i64>,
    edit: Arc<PlanEditData>,
    reference: Arc<PlanEditData>,
    dirty: PlanDirtyState,
    stale: bool,
    account: Arc<MasterAccount>,
    previous_plans: Arc<Vec<Plan>>,
    options: ComputeOptions,
    requirements: Arc<PlanRequirementsResult>,
    deficits: Arc<PlanDeficits>,
}

impl PlanState {
    fn update(&mut self, f: impl FnOnce(&mut PlanEditData)) {
        self.edit = copy_on_write(&self.edit, f);
    }

    fn replace(&mut self, plan: &Plan) {
        let data = Arc::new(PlanEditData::from_plan(plan));
        self.account_id = plan.account_id;
        self.group_id = plan.group_id;
        self.edit = Arc::clone(&data);
        self.reference = data;
        self.dirty = PlanDirtyState::default();
        self.stale = false;
    }

    fn refresh_servants(&mut self, instance_ids: impl IntoIterator<Item = InstanceId>) {
        for instance_id in instance_ids {
            let differs = self.edit.servant(instance_id) != self.reference.servant(instance_id);
            mark(&mut self.dirty.servants, instance_id, differs);
        }
        self.dirty.servant_order = self.edit.servant_ids() != self.reference.servant_ids();
    }

    fn recompute_dirty(&mut self) {
        let ids: BTreeSet<InstanceId> = self
            .edit
            .servant_ids()
            .into_iter()
            .chain(self.reference.servant_ids())
            .collect();
        self.dirty = PlanDirtyState {
            info: self.edit.info != self.reference.info,
            enabled: self.edit.enabled != self.reference.enabled,
            servants: BTreeSet::new(),
            servant_order: false,
            costumes: self.edit.costumes != self.reference.costumes,
            upcoming_resources: self.edit.upcoming_resources != self.reference.upcoming_resources,
        };
        self.refresh_servants(ids);
    }

    fn snapshot(&self, plan_id: PlanId) -> Plan {
        Plan {
            plan_id,
            account_id: self.account_id,
            name: self.edit.info.name.clone(),
            description: self.edit.info.description.clone(),
            group_id: self.group_id,
            enabled: *self.edit.enabled,
            servants: (*self.edit.servants).clone(),
            costumes: (*self.edit.costumes).clone(),
            upcoming_resources: (*self.edit.upcoming_resources).clone(),
        }
    }
}

/// Edit session over one plan. Requirements are recomputed after every
/// change and published on the event bus.
pub struct PlanEditSession {
    id: Uuid,
    plan_id: PlanId,
    catalog: Arc<Catalog>,
    store: Arc<dyn PlanStore>,
    events: Arc<EventBus>,
    request: RequestFlag,
    state: Mutex<PlanState>,
}

impl PlanEditSession {
    pub fn new(
        store: Arc<dyn PlanStore>,
        catalog: Arc<Catalog>,
        events: Arc<EventBus>,
        plan: &Plan,
        previous_plans: Vec<Plan>,
        account: Arc<MasterAccount>,
        options: ComputeOptions,
    ) -> Self {
        let data = Arc::new(PlanEditData::from_plan(plan));
        let session = Self {
            id: Uuid::new_v4(),
            plan_id: plan.plan_id,
            catalog,
            store,
            events,
            request: RequestFlag::default(),
            state: Mutex::new(PlanState {
                account_id: plan.account_id,
                group_id: plan.group_id,
                edit: Arc::clone(&data),
                reference: data,
                dirty: PlanDirtyState::default(),
                stale: false,
                account,
                previous_plans: Arc::new(previous_plans),
                options,
                requirements: Arc::default(),
                deficits: Arc::default(),
            }),
        };
        session.recompute(&mut lock(&session.state));
        session
    }

    pub async fn load(
        store: Arc<dyn PlanStore>,
        catalog: Arc<Catalog>,
        events: Arc<EventBus>,
        plan_id: PlanId,
        account: Arc<MasterAccount>,
        options: ComputeOptions,
    ) -> SessionResult<Self> {
        let plan = store.load_plan(plan_id).await?;
        let previous_plans = store.load_previous_plans(plan_id).await?;
        tracing::debug!(
            "Opened plan session for {} ({} servants, {} previous plans)",
            plan_id,
            plan.servants.len(),
            previous_plans.len()
        );
        Ok(Self::new(
            store,
            catalog,
            events,
            &plan,
            previous_plans,
            account,
            options,
        ))
    }

    fn recompute(&self, state: &mut PlanState) {
        let plan = state.snapshot(self.plan_id);
        let result = compute_plan_requirements(
            &self.catalog,
            &plan,
            &state.account,
            &state.previous_plans,
            &state.options,
        );
        let deficits = compute_plan_deficits(
            &result,
            &state.account.resources,
            &plan,
            &state.previous_plans,
        );
        state.requirements = Arc::new(result);
        state.deficits = Arc::new(deficits);
        self.events.publish_requirements(RequirementsUpdated {
            plan_id: self.plan_id,
            requirements: Arc::clone(&state.requirements),
            deficits: Arc::clone(&state.deficits),
        });
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn plan_id(&self) -> PlanId {
        self.plan_id
    }

    pub fn edit(&self) -> Arc<PlanEditData> {
        Arc::clone(&lock(&self.state).edit)
    }

    pub fn reference(&self) -> Arc<PlanEditData> {
        Arc::clone(&lock(&self.state).reference)
    }

    pub fn dirty(&self) -> PlanDirtyState {
        lock(&self.state).dirty.clone()
    }

    pub fn is_dirty(&self) -> bool {
        lock(&self.state).dirty.is_dirty()
    }

    pub fn is_stale(&self) -> bool {
        lock(&self.state).stale
    }

    pub fn is_request_in_flight(&self) -> bool {
        self.request.is_active()
    }

    pub fn snapshot(&self) -> Plan {
        lock(&self.state).snapshot(self.plan_id)
    }

    pub fn previous_plans(&self) -> Arc<Vec<Plan>> {
        Arc::clone(&lock(&self.state).previous_plans)
    }

    pub fn requirements(&self) -> Arc<PlanRequirementsResult> {
        Arc::clone(&lock(&self.state).requirements)
    }

    /// Deficits against the current account snapshot, counting unsaved
    /// pledges.
    pub fn deficits(&self) -> Arc<PlanDeficits> {
        Arc::clone(&lock(&self.state).deficits)
    }

    pub fn options(&self) -> ComputeOptions {
        lock(&self.state).options
    }

    pub fn set_options(&self, options: ComputeOptions) {
        let mut state = lock(&self.state);
        state.options = options;
        self.recompute(&mut state);
    }

    /// Swaps in a newer account snapshot, e.g. after the account session
    /// changed or reloaded.
    pub fn set_account(&self, account: Arc<MasterAccount>) {
        let mut state = lock(&self.state);
        state.account = account;
        self.recompute(&mut state);
    }

    pub fn set_previous_plans(&self, previous_plans: Vec<Plan>) {
        let mut state = lock(&self.state);
        state.previous_plans = Arc::new(previous_plans);
        self.recompute(&mut state);
    }

    /// Adds owned servants with targets equal to their current state. Servants
    /// already in the plan are left as they are.
    pub fn add_servants(&self, instance_ids: &[InstanceId]) -> SessionResult<Vec<InstanceId>> {
        let mut state = lock(&self.state);
        let mut added: Vec<PlanServant> = Vec::new();
        for instance_id in instance_ids {
            let master = state
                .account
                .servant(*instance_id)
                .ok_or(SessionError::UnknownInstance(*instance_id))?;
            let present = state.edit.servant(*instance_id).is_some()
                || added.iter().any(|s| s.instance_id == *instance_id);
            if !present {
                added.push(PlanServant::from_master(master));
            }
        }

        let added_ids: Vec<InstanceId> = added.iter().map(|s| s.instance_id).collect();
        state.update(|data| {
            data.servants = copy_on_write(&data.servants, |list| list.extend(added));
        });
        state.refresh_servants(added_ids.iter().copied());
        self.recompute(&mut state);
        Ok(added_ids)
    }

    pub fn remove_servants(&self, instance_ids: &[InstanceId]) {
        let mut state = lock(&self.state);
        state.update(|data| {
            data.servants = copy_on_write(&data.servants, |list| {
                list.retain(|s| !instance_ids.contains(&s.instance_id));
            });
        });
        state.refresh_servants(instance_ids.iter().copied());
        self.recompute(&mut state);
    }

    /// Applies one batch edit to every listed servant.
    pub fn edit_servants(
        &self,
        instance_ids: &[InstanceId],
        edit: &PlanServantEdit,
    ) -> SessionResult<()> {
        let mut state = lock(&self.state);
        if let Some(missing) = instance_ids
            .iter()
            .find(|id| state.edit.servant(**id).is_none())
        {
            return Err(SessionError::UnknownInstance(*missing));
        }

        state.update(|data| {
            data.servants = copy_on_write(&data.servants, |list| {
                for servant in list
                    .iter_mut()
                    .filter(|s| instance_ids.contains(&s.instance_id))
                {
                    edit.apply_to(servant);
                }
            });
        });
        state.refresh_servants(instance_ids.iter().copied());
        self.recompute(&mut state);
        Ok(())
    }

    pub fn reorder_servants(&self, instance_ids: &[InstanceId]) -> SessionResult<()> {
        let mut state = lock(&self.state);
        check_permutation(&state.edit.servant_ids(), instance_ids)?;
        state.update(|data| {
            data.servants = copy_on_write(&data.servants, |list| {
                list.sort_by_key(|s| instance_ids.iter().position(|id| *id == s.instance_id));
            });
        });
        state.refresh_servants(std::iter::empty());
        Ok(())
    }

    pub fn set_costumes(&self, costumes: BTreeSet<CostumeId>) {
        let mut state = lock(&self.state);
        state.update(|data| data.costumes = Arc::new(costumes));
        state.dirty.costumes = state.edit.costumes != state.reference.costumes;
        self.recompute(&mut state);
    }

    pub fn set_enabled(&self, enabled: PlanEnabled) {
        let mut state = lock(&self.state);
        state.update(|data| data.enabled = Arc::new(enabled));
        state.dirty.enabled = state.edit.enabled != state.reference.enabled;
        self.recompute(&mut state);
    }

    pub fn set_upcoming_resources(&self, resources: Vec<UpcomingResource>) {
        let mut state = lock(&self.state);
        state.update(|data| data.upcoming_resources = Arc::new(resources));
        state.dirty.upcoming_resources =
            state.edit.upcoming_resources != state.reference.upcoming_resources;
        self.recompute(&mut state);
    }

    pub fn set_info(&self, info: PlanInfo) {
        let mut state = lock(&self.state);
        state.update(|data| data.info = Arc::new(info));
        state.dirty.info = state.edit.info != state.reference.info;
    }

    pub fn revert(&self) {
        let mut state = lock(&self.state);
        state.edit = Arc::clone(&state.reference);
        state.dirty = PlanDirtyState::default();
        self.recompute(&mut state);
    }

    pub async fn persist(&self) -> SessionResult<()> {
        let _guard = self.request.acquire()?;
        let (edit, plan) = {
            let state = lock(&self.state);
            (Arc::clone(&state.edit), state.snapshot(self.plan_id))
        };

        if let Err(e) = self.store.save_plan(&plan).await {
            tracing::warn!("Failed to persist plan {}: {:#}", self.plan_id, e);
            return Err(e.into());
        }

        {
            let mut state = lock(&self.state);
            state.reference = edit;
            state.recompute_dirty();
        }
        tracing::debug!("Persisted plan {}", self.plan_id);

        self.events.publish_data(DataUpdated {
            data_type: DataType::Plan,
            entity_id: self.plan_id,
            origin: Some(self.id),
        });
        Ok(())
    }

    /// Reloads the plan and the plans chained before it. Refused while dirty.
    pub async fn reload(&self) -> SessionResult<()> {
        if self.is_dirty() {
            return Err(SessionError::UnsavedChanges);
        }
        let _guard = self.request.acquire()?;
        let plan = self.store.load_plan(self.plan_id).await?;
        let previous_plans = self.store.load_previous_plans(self.plan_id).await?;

        let mut state = lock(&self.state);
        if state.dirty.is_dirty() {
            state.stale = true;
            return Err(SessionError::UnsavedChanges);
        }
        state.replace(&plan);
        state.previous_plans = Arc::new(previous_plans);
        self.recompute(&mut state);
        tracing::debug!("Reloaded plan {}", self.plan_id);
        Ok(())
    }

    pub async fn handle_remote_change(
        &self,
        event: &DataUpdated,
    ) -> SessionResult<RemoteChangeOutcome> {
        if event.data_type != DataType::Plan || event.origin == Some(self.id) {
            return Ok(RemoteChangeOutcome::Ignored);
        }

        if event.entity_id != self.plan_id {
            let chained = self
                .previous_plans()
                .iter()
                .any(|plan| plan.plan_id == event.entity_id);
            if !chained {
                return Ok(RemoteChangeOutcome::Ignored);
            }
            // Previous plans are read-only here, so a refresh never touches edits.
            let previous_plans = self.store.load_previous_plans(self.plan_id).await?;
            self.set_previous_plans(previous_plans);
            return Ok(RemoteChangeOutcome::Reloaded);
        }

        match self.reload().await {
            Ok(()) => Ok(RemoteChangeOutcome::Reloaded),
            Err(SessionError::UnsavedChanges | SessionError::RequestInFlight) => {
                tracing::warn!(
                    "Plan {} changed elsewhere while edits are pending; marking stale",
                    self.plan_id
                );
                lock(&self.state).stale = true;
                Ok(RemoteChangeOutcome::MarkedStale)
            }
            Err(e) => Err(e),
        }
    }
}
