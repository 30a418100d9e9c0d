//! Error types for the wallet engine and the external wallet gateway.

use crate::account::{AccountId, AccountRole};
use crate::amount::Amount;
use crate::transaction::TransactionId;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures reported by the external wallet gateway.
///
/// Every transport problem (connection refused, timeout, 5xx, malformed payload)
/// collapses into [`GatewayError::Unavailable`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The remote wallet system does not know the CVU
    #[error("external account {0} not found")]
    NotFound(AccountId),

    /// The remote account cannot cover the amount
    #[error("external account {cvu} has insufficient funds for amount {amount}")]
    InsufficientFunds { cvu: AccountId, amount: Amount },

    /// The remote could not be reached or answered with something unusable
    #[error("external wallet service unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur during engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Request violates a precondition the caller can correct
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Local account missing
    #[error("{role} account {account_id} not found")]
    AccountNotFound {
        role: AccountRole,
        account_id: AccountId,
    },

    /// Local balance does not cover the requested amount
    #[error("account {account_id} has insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Amount,
        requested: Amount,
    },

    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    /// Propagated unchanged from the gateway
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A balance changed between read and commit
    #[error("account {0} was modified concurrently")]
    ConcurrentModification(AccountId),

    /// Invalid environment configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to open or read the input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid operation record in a replay file
    #[error("Invalid operation at row {row}: {message}")]
    InvalidRecord { row: usize, message: String },
}
