//! Account storage.
//!
//! The store is passive: it never validates business rules. Serializing
//! conflicting updates is the engine's job; the store only guarantees that a
//! [`AccountStore::commit`] is applied all-or-nothing and only if every balance
//! still matches what the engine read.

use crate::account::{Account, AccountId};
use crate::amount::Amount;
use crate::error::{EngineError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// First account number handed out is `CVU_OFFSET + 1`.
pub const CVU_OFFSET: u64 = 100_000_000_000;

/// Expected-then-new balance for one account, checked at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub account_id: AccountId,
    pub expected: Amount,
    pub new_balance: Amount,
}

impl BalanceChange {
    pub fn new(account: &Account, new_balance: Amount) -> Self {
        BalanceChange {
            account_id: account.account_id,
            expected: account.balance,
            new_balance,
        }
    }
}

pub trait AccountStore: Send + Sync {
    fn get(&self, account_id: AccountId) -> Option<Account>;

    fn exists(&self, account_id: AccountId) -> bool {
        self.get(account_id).is_some()
    }

    fn find_by_owner(&self, owner_ref: &str) -> Option<Account>;

    /// Upsert keyed by account id.
    fn save(&self, account: Account) -> Account;

    /// Assigns the next sequential account number with a zero balance.
    fn create(&self, owner_ref: &str) -> Account;

    /// Compare-and-set every change atomically.
    ///
    /// Fails with [`EngineError::ConcurrentModification`] (applying nothing) if any
    /// account's current balance differs from `expected`, and with
    /// [`EngineError::InvalidOperation`] if a new balance would be negative.
    fn commit(&self, changes: &[BalanceChange]) -> Result<()>;

    /// All accounts sorted by account id.
    fn all(&self) -> Vec<Account>;
}

/// Process-local store. Account numbers restart at the offset on every new store.
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
    last_number: Mutex<u64>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::with_offset(CVU_OFFSET)
    }

    pub fn with_offset(offset: u64) -> Self {
        InMemoryAccountStore {
            accounts: RwLock::new(HashMap::new()),
            last_number: Mutex::new(offset),
        }
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn get(&self, account_id: AccountId) -> Option<Account> {
        self.accounts.read().get(&account_id).cloned()
    }

    fn exists(&self, account_id: AccountId) -> bool {
        self.accounts.read().contains_key(&account_id)
    }

    fn find_by_owner(&self, owner_ref: &str) -> Option<Account> {
        self.accounts
            .read()
            .values()
            .find(|a| a.owner_ref == owner_ref)
            .cloned()
    }

    fn save(&self, account: Account) -> Account {
        self.accounts
            .write()
            .insert(account.account_id, account.clone());
        account
    }

    fn create(&self, owner_ref: &str) -> Account {
        let account_id = {
            let mut last = self.last_number.lock();
            *last += 1;
            AccountId(*last)
        };
        self.save(Account::new(account_id, owner_ref))
    }

    fn commit(&self, changes: &[BalanceChange]) -> Result<()> {
        let mut accounts = self.accounts.write();

        for change in changes {
            let current = accounts
                .get(&change.account_id)
                .ok_or(EngineError::ConcurrentModification(change.account_id))?;
            if current.balance != change.expected {
                return Err(EngineError::ConcurrentModification(change.account_id));
            }
            if change.new_balance.is_negative() {
                return Err(EngineError::InvalidOperation(format!(
                    "balance of account {} cannot become negative",
                    change.account_id
                )));
            }
        }

        for change in changes {
            if let Some(account) = accounts.get_mut(&change.account_id) {
                account.balance = change.new_balance;
            }
        }

        Ok(())
    }

    fn all(&self) -> Vec<Account> {
        let mut accounts: Vec<_> = self.accounts.read().values().cloned().collect();
        accounts.sort_by_key(|a| a.account_id);
        accounts
    }
}
