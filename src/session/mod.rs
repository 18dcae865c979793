//! Edit sessions: an editable copy of an account or plan tracked against the
//! last loaded/persisted reference copy.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

pub mod account;
pub mod plan;
pub mod store;
pub mod workspace;

pub use account::{AccountDirtyState, AccountEditData, AccountEditSession, NewServant};
pub use plan::{PlanDirtyState, PlanEditData, PlanEditSession, PlanInfo};
pub use store::{AccountStore, PlanStore};
pub use workspace::{PersistAllOutcome, PlannerWorkspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteChangeOutcome {
    Reloaded,
    MarkedStale,
    Ignored,
}

/// Exclusive "awaiting request" flag for one entity.
#[derive(Debug, Clone, Default)]
pub struct RequestFlag(Arc<AtomicBool>);

impl RequestFlag {
    pub fn acquire(&self) -> SessionResult<RequestGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::RequestInFlight)?;
        Ok(RequestGuard {
            flag: Arc::clone(&self.0),
        })
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Clears the flag when dropped, including on early error returns.
#[derive(Debug)]
pub struct RequestGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Returns a new `Arc` holding `value` with `f` applied. The input is never
/// touched.
pub(crate) fn copy_on_write<T: Clone>(value: &Arc<T>, f: impl FnOnce(&mut T)) -> Arc<T> {
    let mut copy = T::clone(value);
    f(&mut copy);
    Arc::new(copy)
}

pub(crate) fn mark<K: Ord>(set: &mut BTreeSet<K>, key: K, differs: bool) {
    if differs {
        set.insert(key);
    } else {
        set.remove(&key);
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Rejects `ids` unless it is a permutation of `current`.
pub(crate) fn check_permutation(current: &[i64], ids: &[i64]) -> SessionResult<()> {
    let mut expected: Vec<i64> = current.to_vec();
    let mut given: Vec<i64> = ids.to_vec();
    expected.sort_unstable();
    given.sort_unstable();
    if expected != given {
        return Err(SessionError::Validation(
            "reorder must list every servant exactly once".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_guard_is_exclusive_and_released_on_drop() {
        let flag = RequestFlag::default();
        let guard = flag.acquire().unwrap();
        assert!(flag.is_active());
        assert!(matches!(flag.acquire(), Err(SessionError::RequestInFlight)));

        drop(guard);
        assert!(!flag.is_active());
        assert!(flag.acquire().is_ok());
    }

    #[test]
    fn test_copy_on_write_leaves_input_alone() {
        let original = Arc::new(vec![1, 2, 3]);
        let updated = copy_on_write(&original, |v| v.push(4));

        assert_eq!(*original, vec![1, 2, 3]);
        assert_eq!(*updated, vec![1, 2, 3, 4]);
        assert!(!Arc::ptr_eq(&original, &updated));
    }

    #[test]
    fn test_check_permutation() {
        assert!(check_permutation(&[1, 2, 3], &[3, 1, 2]).is_ok());
        assert!(check_permutation(&[1, 2, 3], &[1, 2]).is_err());
        assert!(check_permutation(&[1, 2], &[1, 1]).is_err());
    }
}
