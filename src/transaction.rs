//! Transaction records and their caller-facing view.
//!
//! A transaction is either a P2P transfer between two local accounts or an
//! external movement between a local account and a remote wallet. Both share
//! id, amount, currency, status and timestamp; the counterparties live in the
//! per-variant payload.

use crate::account::AccountId;
use crate::amount::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ledger-unique transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Currency code. Defaults to ARS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Ars,
    Usd,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Ars => f.write_str("ARS"),
            Currency::Usd => f.write_str("USD"),
        }
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ARS" => Ok(Currency::Ars),
            "USD" => Ok(Currency::Usd),
            other => Err(format!("unknown currency '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    P2p,
    Deposit,
    Withdrawal,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::P2p => f.write_str("P2P"),
            TransactionKind::Deposit => f.write_str("DEPOSIT"),
            TransactionKind::Withdrawal => f.write_str("WITHDRAWAL"),
        }
    }
}

/// Only terminal-success records are ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Completed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Completed => f.write_str("COMPLETED"),
        }
    }
}

/// Funds moved between two local accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2pTransfer {
    pub payer: AccountId,
    pub payee: AccountId,
}

/// Which way funds crossed the system boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// External wallet → local account.
    Inbound,
    /// Local account → external wallet.
    Outbound,
}

/// Funds moved between a local account and a remote wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTransfer {
    pub direction: Direction,
    pub internal_account: AccountId,
    pub external_cvu: AccountId,
    /// Caller reference for deposits, remote bank label for withdrawals.
    pub external_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionDetails {
    P2p(P2pTransfer),
    External(ExternalTransfer),
}

/// A transaction that has not been appended to the ledger yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingTransaction {
    pub amount: Amount,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    pub details: TransactionDetails,
}

/// An immutable, completed transaction as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub amount: Amount,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub details: TransactionDetails,
}

impl Transaction {
    pub(crate) fn from_pending(id: TransactionId, pending: PendingTransaction) -> Self {
        Transaction {
            id,
            amount: pending.amount,
            currency: pending.currency,
            status: TransactionStatus::Completed,
            created_at: pending.created_at,
            details: pending.details,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        match &self.details {
            TransactionDetails::P2p(_) => TransactionKind::P2p,
            TransactionDetails::External(ext) => match ext.direction {
                Direction::Inbound => TransactionKind::Deposit,
                Direction::Outbound => TransactionKind::Withdrawal,
            },
        }
    }

    /// Returns `true` if the local account takes part in this transaction.
    pub fn involves(&self, account: AccountId) -> bool {
        match &self.details {
            TransactionDetails::P2p(p2p) => p2p.payer == account || p2p.payee == account,
            TransactionDetails::External(ext) => ext.internal_account == account,
        }
    }

    pub fn view(&self) -> TransactionView {
        let (payer, payee, external_reference) = match &self.details {
            TransactionDetails::P2p(p2p) => (Party::Local(p2p.payer), Party::Local(p2p.payee), None),
            TransactionDetails::External(ext) => {
                let local = Party::Local(ext.internal_account);
                let remote = Party::External(ext.external_cvu);
                let reference = Some(ext.external_reference.clone());
                match ext.direction {
                    Direction::Inbound => (remote, local, reference),
                    Direction::Outbound => (local, remote, reference),
                }
            }
        };

        TransactionView {
            transaction_id: self.id,
            kind: self.kind(),
            amount: self.amount,
            currency: self.currency,
            status: self.status,
            created_at: self.created_at,
            payer,
            payee,
            external_reference,
        }
    }
}

/// One side of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "side", content = "cvu", rename_all = "lowercase")]
pub enum Party {
    Local(AccountId),
    External(AccountId),
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Local(id) => write!(f, "{}", id),
            Party::External(id) => write!(f, "external:{}", id),
        }
    }
}

/// What every engine operation returns on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub transaction_id: TransactionId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Amount,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub payer: Party,
    pub payee: Party,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
}
