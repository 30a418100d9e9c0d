//! Per-account mutation locks.
//!
//! Every balance-changing operation holds the locks of all local accounts it
//! touches for its whole read-validate-write-append sequence. Locks are always
//! taken in ascending account order, so two transfers in opposite directions
//! cannot deadlock.

use crate::account::AccountId;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct AccountLocks {
    table: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the lock handles for `accounts`, sorted and deduplicated.
    pub fn set(&self, accounts: &[AccountId]) -> LockSet<'_> {
        let mut ids = accounts.to_vec();
        ids.sort();
        ids.dedup();

        let mut table = self.table.lock();
        let handles = ids
            .into_iter()
            .map(|id| (id, Arc::clone(table.entry(id).or_default())))
            .collect();
        LockSet {
            owner: self,
            handles,
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.table.lock().len()
    }
}

/// Lock handles for one operation. Entries no other set refers to are
/// removed from the table on drop.
pub struct LockSet<'a> {
    owner: &'a AccountLocks,
    handles: Vec<(AccountId, Arc<Mutex<()>>)>,
}

impl LockSet<'_> {
    /// Blocks until every lock in the set is held. Released when the guards drop.
    pub fn lock_all(&self) -> Vec<MutexGuard<'_, ()>> {
        self.handles.iter().map(|(_, h)| h.lock()).collect()
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        let mut table = self.owner.table.lock();
        // handles are released while the table is still locked
        for (id, handle) in self.handles.drain(..) {
            // one reference in the table, one here
            if Arc::strong_count(&handle) == 2 {
                table.remove(&id);
            }
        }
    }
}
