//! Append-only transaction ledger.
//!
//! P2P and external transactions live in separate sub-ledgers. Ids come from
//! one shared sequence so a transaction id is unique across both, and the
//! per-account view is a merge of the two.

use crate::account::AccountId;
use crate::transaction::{PendingTransaction, Transaction, TransactionDetails, TransactionId};
use parking_lot::{Mutex, RwLock};

/// One append-only list of completed transactions.
#[derive(Default)]
pub struct SubLedger {
    entries: RwLock<Vec<Transaction>>,
}

impl SubLedger {
    fn push(&self, transaction: Transaction) {
        self.entries.write().push(transaction);
    }

    pub fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.entries.read().iter().find(|t| t.id == id).cloned()
    }

    pub fn list_by_account(&self, account: AccountId) -> Vec<Transaction> {
        self.entries
            .read()
            .iter()
            .filter(|t| t.involves(account))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-only outside the crate; only the engine appends.
///
/// ```compile_fail
/// use wallet_engine::transaction::PendingTransaction;
/// ```
pub struct Ledger {
    p2p: SubLedger,
    external: SubLedger,
    last_id: Mutex<u64>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger {
            p2p: SubLedger::default(),
            external: SubLedger::default(),
            last_id: Mutex::new(0),
        }
    }

    /// Assigns the next id and stores the transaction in its sub-ledger.
    pub(crate) fn append(&self, pending: PendingTransaction) -> Transaction {
        // id assignment and push happen under one lock so each sub-ledger stays in id order
        let mut last_id = self.last_id.lock();
        *last_id += 1;
        let transaction = Transaction::from_pending(TransactionId(*last_id), pending);

        match transaction.details {
            TransactionDetails::P2p(_) => self.p2p.push(transaction.clone()),
            TransactionDetails::External(_) => self.external.push(transaction.clone()),
        }
        transaction
    }

    pub fn get(&self, id: TransactionId) -> Option<Transaction> {
        self.p2p.get(id).or_else(|| self.external.get(id))
    }

    /// Every transaction the account takes part in, P2P first. Unordered otherwise.
    pub fn list_by_account(&self, account: AccountId) -> Vec<Transaction> {
        let mut transactions = self.p2p.list_by_account(account);
        transactions.extend(self.external.list_by_account(account));
        transactions
    }

    pub fn p2p(&self) -> &SubLedger {
        &self.p2p
    }

    pub fn external(&self) -> &SubLedger {
        &self.external
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
