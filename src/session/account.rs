use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    check_permutation, copy_on_write, lock, mark, AccountStore, RemoteChangeOutcome, RequestFlag,
};
use crate::error::{SessionError, SessionResult};
use crate::events::{DataType, DataUpdated, EventBus};
use crate::model::{
    AccountId, AccountResources, CostumeId, EnhancementState, GameServantId, InstanceId, ItemId,
    MasterAccount, MasterServant,
};
use crate::planner::RequirementAccumulator;

/// Editable parts of an account. Every change installs new `Arc`s for the
/// container and the touched field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEditData {
    pub resources: Arc<AccountResources>,
    pub servants: Arc<Vec<MasterServant>>,
    pub costumes: Arc<BTreeSet<CostumeId>>,
    pub bond_levels: Arc<BTreeMap<GameServantId, u8>>,
}

impl AccountEditData {
    fn from_account(account: &MasterAccount) -> Self {
        let mut resources = account.resources.clone();
        resources.items.retain(|_, quantity| *quantity > 0);
        Self {
            resources: Arc::new(resources),
            servants: Arc::new(account.servants.clone()),
            costumes: Arc::new(account.costumes.clone()),
            bond_levels: Arc::new(account.bond_levels.clone()),
        }
    }

    pub fn servant(&self, instance_id: InstanceId) -> Option<&MasterServant> {
        self.servants.iter().find(|s| s.instance_id == instance_id)
    }

    fn servant_ids(&self) -> Vec<InstanceId> {
        self.servants.iter().map(|s| s.instance_id).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDirtyState {
    pub items: BTreeSet<ItemId>,
    pub qp: bool,
    pub servants: BTreeSet<InstanceId>,
    pub servant_order: bool,
    pub costumes: bool,
    pub bond_levels: BTreeSet<GameServantId>,
}

impl AccountDirtyState {
    pub fn is_dirty(&self) -> bool {
        !self.items.is_empty()
            || self.qp
            || !self.servants.is_empty()
            || self.servant_order
            || self.costumes
            || !self.bond_levels.is_empty()
    }
}

/// A servant to be added; its instance id is assigned by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewServant {
    pub game_id: GameServantId,
    pub summon_date: Option<NaiveDate>,
    pub state: EnhancementState,
}

#[derive(Debug)]
struct AccountState {
    name: String,
    edit: Arc<AccountEditData>,
    reference: Arc<AccountEditData>,
    dirty: AccountDirtyState,
    next_instance_id: InstanceId,
    stale: bool,
}

impl AccountState {
    fn new(account: &MasterAccount) -> Self {
        let data = Arc::new(AccountEditData::from_account(account));
        Self {
            name: account.name.clone(),
            edit: Arc::clone(&data),
            reference: data,
            dirty: AccountDirtyState::default(),
            next_instance_id: account.min_next_instance_id(),
            stale: false,
        }
    }

    fn replace(&mut self, account: &MasterAccount) {
        let next_instance_id = self.next_instance_id.max(account.min_next_instance_id());
        *self = Self::new(account);
        self.next_instance_id = next_instance_id;
    }

    fn update(&mut self, f: impl FnOnce(&mut AccountEditData)) {
        self.edit = copy_on_write(&self.edit, f);
    }

    fn refresh_items(&mut self, item_ids: impl IntoIterator<Item = ItemId>) {
        for item_id in item_ids {
            let differs =
                self.edit.resources.quantity(item_id) != self.reference.resources.quantity(item_id);
            mark(&mut self.dirty.items, item_id, differs);
        }
    }

    fn refresh_qp(&mut self) {
        self.dirty.qp = self.edit.resources.qp != self.reference.resources.qp;
    }

    fn refresh_servants(&mut self, instance_ids: impl IntoIterator<Item = InstanceId>) {
        for instance_id in instance_ids {
            let differs = self.edit.servant(instance_id) != self.reference.servant(instance_id);
            mark(&mut self.dirty.servants, instance_id, differs);
        }
        self.dirty.servant_order = self.edit.servant_ids() != self.reference.servant_ids();
    }

    fn refresh_costumes(&mut self) {
        self.dirty.costumes = self.edit.costumes != self.reference.costumes;
    }

    fn refresh_bond_levels(&mut self, game_ids: impl IntoIterator<Item = GameServantId>) {
        for game_id in game_ids {
            let differs =
                self.edit.bond_levels.get(&game_id) != self.reference.bond_levels.get(&game_id);
            mark(&mut self.dirty.bond_levels, game_id, differs);
        }
    }

    fn recompute_dirty(&mut self) {
        self.dirty = AccountDirtyState::default();

        let items: BTreeSet<ItemId> = self
            .edit
            .resources
            .items
            .keys()
            .chain(self.reference.resources.items.keys())
            .copied()
            .collect();
        self.refresh_items(items);
        self.refresh_qp();

        let servants: BTreeSet<InstanceId> = self
            .edit
            .servant_ids()
            .into_iter()
            .chain(self.reference.servant_ids())
            .collect();
        self.refresh_servants(servants);
        self.refresh_costumes();

        let bonds: BTreeSet<GameServantId> = self
            .edit
            .bond_levels
            .keys()
            .chain(self.reference.bond_levels.keys())
            .copied()
            .collect();
        self.refresh_bond_levels(bonds);
    }

    fn snapshot(&self, account_id: AccountId) -> MasterAccount {
        MasterAccount {
            account_id,
            name: self.name.clone(),
            resources: (*self.edit.resources).clone(),
            servants: (*self.edit.servants).clone(),
            costumes: (*self.edit.costumes).clone(),
            bond_levels: (*self.edit.bond_levels).clone(),
            next_instance_id: self.next_instance_id,
        }
    }

    fn require_servants(&self, instance_ids: &[InstanceId]) -> SessionResult<()> {
        match instance_ids
            .iter()
            .find(|id| self.edit.servant(**id).is_none())
        {
            Some(missing) => Err(SessionError::UnknownInstance(*missing)),
            None => Ok(()),
        }
    }
}

/// Edit session over one account's resources, servants, costumes and bond
/// levels.
pub struct AccountEditSession {
    id: Uuid,
    account_id: AccountId,
    store: Arc<dyn AccountStore>,
    events: Arc<EventBus>,
    request: RequestFlag,
    state: Mutex<AccountState>,
}

impl AccountEditSession {
    pub fn new(store: Arc<dyn AccountStore>, events: Arc<EventBus>, account: &MasterAccount) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account.account_id,
            store,
            events,
            request: RequestFlag::default(),
            state: Mutex::new(AccountState::new(account)),
        }
    }

    pub async fn load(
        store: Arc<dyn AccountStore>,
        events: Arc<EventBus>,
        account_id: AccountId,
    ) -> SessionResult<Self> {
        let account = store.load_account(account_id).await?;
        tracing::debug!(
            "Opened account session for {} ({} servants)",
            account_id,
            account.servants.len()
        );
        Ok(Self::new(store, events, &account))
    }

    /// Identifies this session as the origin of its own change events.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn edit(&self) -> Arc<AccountEditData> {
        Arc::clone(&lock(&self.state).edit)
    }

    pub fn reference(&self) -> Arc<AccountEditData> {
        Arc::clone(&lock(&self.state).reference)
    }

    pub fn dirty(&self) -> AccountDirtyState {
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

    pub fn next_instance_id(&self) -> InstanceId {
        lock(&self.state).next_instance_id
    }

    /// The edit copy as a full account.
    pub fn snapshot(&self) -> MasterAccount {
        lock(&self.state).snapshot(self.account_id)
    }

    pub fn set_item_quantities(&self, quantities: &BTreeMap<ItemId, u64>) {
        let mut state = lock(&self.state);
        state.update(|data| {
            data.resources = copy_on_write(&data.resources, |resources| {
                for (item_id, quantity) in quantities {
                    if *quantity == 0 {
                        resources.items.remove(item_id);
                    } else {
                        resources.items.insert(*item_id, *quantity);
                    }
                }
            });
        });
        state.refresh_items(quantities.keys().copied());
    }

    pub fn set_item_quantity(&self, item_id: ItemId, quantity: u64) {
        self.set_item_quantities(&BTreeMap::from([(item_id, quantity)]));
    }

    pub fn set_qp(&self, qp: u64) {
        let mut state = lock(&self.state);
        state.update(|data| {
            data.resources = copy_on_write(&data.resources, |resources| resources.qp = qp);
        });
        state.refresh_qp();
    }

    /// Subtracts `requirements` from inventory, stopping at zero.
    pub fn deduct_requirements(&self, requirements: &RequirementAccumulator) {
        let mut state = lock(&self.state);
        state.update(|data| {
            data.resources = copy_on_write(&data.resources, |resources| {
                for (item_id, requirement) in &requirements.items {
                    let remaining = resources
                        .quantity(*item_id)
                        .saturating_sub(requirement.total);
                    if remaining == 0 {
                        resources.items.remove(item_id);
                    } else {
                        resources.items.insert(*item_id, remaining);
                    }
                }
                resources.qp = resources.qp.saturating_sub(requirements.currency);
            });
        });
        state.refresh_items(requirements.items.keys().copied());
        state.refresh_qp();
    }

    /// Appends servants with freshly assigned instance ids and returns them.
    pub fn add_servants(&self, servants: Vec<NewServant>) -> Vec<InstanceId> {
        let mut state = lock(&self.state);
        let first_id = state.next_instance_id;
        let ids: Vec<InstanceId> = (first_id..).take(servants.len()).collect();
        state.next_instance_id = first_id + ids.len() as InstanceId;

        state.update(|data| {
            data.servants = copy_on_write(&data.servants, |list| {
                list.extend(ids.iter().zip(servants).map(|(id, servant)| MasterServant {
                    instance_id: *id,
                    game_id: servant.game_id,
                    summon_date: servant.summon_date,
                    state: servant.state,
                }));
            });
        });
        state.refresh_servants(ids.iter().copied());
        ids
    }

    /// Applies `f` to each listed servant. Fails without changing anything if
    /// any id is unknown.
    pub fn update_servants(
        &self,
        instance_ids: &[InstanceId],
        f: impl Fn(&mut MasterServant),
    ) -> SessionResult<()> {
        let mut state = lock(&self.state);
        state.require_servants(instance_ids)?;
        state.update(|data| {
            data.servants = copy_on_write(&data.servants, |list| {
                for servant in list
                    .iter_mut()
                    .filter(|s| instance_ids.contains(&s.instance_id))
                {
                    f(servant);
                }
            });
        });
        state.refresh_servants(instance_ids.iter().copied());
        Ok(())
    }

    pub fn update_servant_state(
        &self,
        instance_id: InstanceId,
        new_state: EnhancementState,
    ) -> SessionResult<()> {
        self.update_servants(&[instance_id], |servant| servant.state = new_state)
    }

    pub fn delete_servants(&self, instance_ids: &[InstanceId]) {
        let mut state = lock(&self.state);
        state.update(|data| {
            data.servants = copy_on_write(&data.servants, |list| {
                list.retain(|s| !instance_ids.contains(&s.instance_id));
            });
        });
        state.refresh_servants(instance_ids.iter().copied());
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
        state.refresh_costumes();
    }

    pub fn unlock_costumes(&self, costumes: impl IntoIterator<Item = CostumeId>) {
        let mut state = lock(&self.state);
        state.update(|data| {
            data.costumes = copy_on_write(&data.costumes, |owned| owned.extend(costumes));
        });
        state.refresh_costumes();
    }

    /// `None` clears the bond level.
    pub fn set_bond_level(&self, game_id: GameServantId, level: Option<u8>) {
        let mut state = lock(&self.state);
        state.update(|data| {
            data.bond_levels = copy_on_write(&data.bond_levels, |bonds| match level {
                Some(level) => {
                    bonds.insert(game_id, level);
                }
                None => {
                    bonds.remove(&game_id);
                }
            });
        });
        state.refresh_bond_levels([game_id]);
    }

    /// Discards edits. Assigned instance ids are not handed out again.
    pub fn revert(&self) {
        let mut state = lock(&self.state);
        state.edit = Arc::clone(&state.reference);
        state.dirty = AccountDirtyState::default();
    }

    pub async fn persist(&self) -> SessionResult<()> {
        let _guard = self.request.acquire()?;
        let (edit, account) = {
            let state = lock(&self.state);
            (Arc::clone(&state.edit), state.snapshot(self.account_id))
        };

        if let Err(e) = self.store.save_account(&account).await {
            tracing::warn!("Failed to persist account {}: {:#}", self.account_id, e);
            return Err(e.into());
        }

        {
            let mut state = lock(&self.state);
            state.reference = edit;
            state.recompute_dirty();
        }
        tracing::debug!("Persisted account {}", self.account_id);

        self.events.publish_data(DataUpdated {
            data_type: DataType::Account,
            entity_id: self.account_id,
            origin: Some(self.id),
        });
        Ok(())
    }

    /// Replaces both copies with the stored account. Refused while dirty.
    pub async fn reload(&self) -> SessionResult<()> {
        if self.is_dirty() {
            return Err(SessionError::UnsavedChanges);
        }
        let _guard = self.request.acquire()?;
        let account = self.store.load_account(self.account_id).await?;

        let mut state = lock(&self.state);
        if state.dirty.is_dirty() {
            state.stale = true;
            return Err(SessionError::UnsavedChanges);
        }
        state.replace(&account);
        tracing::debug!("Reloaded account {}", self.account_id);
        Ok(())
    }

    pub async fn handle_remote_change(
        &self,
        event: &DataUpdated,
    ) -> SessionResult<RemoteChangeOutcome> {
        if event.data_type != DataType::Account
            || event.entity_id != self.account_id
            || event.origin == Some(self.id)
        {
            return Ok(RemoteChangeOutcome::Ignored);
        }

        match self.reload().await {
            Ok(()) => Ok(RemoteChangeOutcome::Reloaded),
            Err(SessionError::UnsavedChanges | SessionError::RequestInFlight) => {
                tracing::warn!(
                    "Account {} changed elsewhere while edits are pending; marking stale",
                    self.account_id
                );
                lock(&self.state).stale = true;
                Ok(RemoteChangeOutcome::MarkedStale)
            }
            Err(e) => Err(e),
        }
    }
}
