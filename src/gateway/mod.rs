//! Boundary to the external wallet system.
//!
//! The engine only sees [`WalletGateway`]. [`http::HttpWalletGateway`] talks to
//! the real service; [`memory::InMemoryWalletGateway`] simulates one for tests
//! and offline replays.
//!
//! `initiate_deposit` moves real money on the remote side and is not
//! idempotent. No implementation retries it.

pub mod http;
pub mod memory;

use crate::account::AccountId;
use crate::amount::Amount;
use crate::error::GatewayError;
use crate::transaction::Currency;
use std::sync::Arc;

pub use http::HttpWalletGateway;
pub use memory::InMemoryWalletGateway;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Result of a successful existence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvuValidation {
    pub cvu: AccountId,
    pub bank_name: Option<String>,
}

/// Result of a successful balance check. Only returned when funds are sufficient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceValidation {
    pub cvu: AccountId,
    pub balance: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositOrder {
    pub destination: AccountId,
    pub amount: Amount,
    pub currency: Currency,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositStatus {
    Completed,
    /// Anything else the remote reports ("FAILED", "PROCESSING", ...).
    Other(String),
}

impl DepositStatus {
    pub fn parse(status: &str) -> Self {
        if status == "COMPLETED" {
            DepositStatus::Completed
        } else {
            DepositStatus::Other(status.to_string())
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DepositStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReceipt {
    pub remote_transaction_id: String,
    pub status: DepositStatus,
    pub message: Option<String>,
}

pub trait WalletGateway: Send + Sync {
    /// Fails with `NotFound` if the remote does not know `cvu`.
    fn validate_account_exists(&self, cvu: AccountId) -> GatewayResult<CvuValidation>;

    /// Confirms existence first, then that the remote balance covers `amount`.
    fn validate_sufficient_balance(
        &self,
        cvu: AccountId,
        amount: Amount,
    ) -> GatewayResult<BalanceValidation>;

    /// Side-effecting, call at most once per withdrawal attempt.
    fn initiate_deposit(&self, order: &DepositOrder) -> GatewayResult<DepositReceipt>;
}

impl<G: WalletGateway + ?Sized> WalletGateway for Box<G> {
    fn validate_account_exists(&self, cvu: AccountId) -> GatewayResult<CvuValidation> {
        (**self).validate_account_exists(cvu)
    }

    fn validate_sufficient_balance(
        &self,
        cvu: AccountId,
        amount: Amount,
    ) -> GatewayResult<BalanceValidation> {
        (**self).validate_sufficient_balance(cvu, amount)
    }

    fn initiate_deposit(&self, order: &DepositOrder) -> GatewayResult<DepositReceipt> {
        (**self).initiate_deposit(order)
    }
}

impl<G: WalletGateway + ?Sized> WalletGateway for Arc<G> {
    fn validate_account_exists(&self, cvu: AccountId) -> GatewayResult<CvuValidation> {
        (**self).validate_account_exists(cvu)
    }

    fn validate_sufficient_balance(
        &self,
        cvu: AccountId,
        amount: Amount,
    ) -> GatewayResult<BalanceValidation> {
        (**self).validate_sufficient_balance(cvu, amount)
    }

    fn initiate_deposit(&self, order: &DepositOrder) -> GatewayResult<DepositReceipt> {
        (**self).initiate_deposit(order)
    }
}
