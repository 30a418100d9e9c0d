//! Wallet account model.
//!
//! Maintains the invariant: `balance >= 0` at all times.

use crate::amount::Amount;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account number (the CVU). Addresses both local and external wallets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(AccountId)
    }
}

impl From<u64> for AccountId {
    fn from(value: u64) -> Self {
        AccountId(value)
    }
}

/// The part an account plays in an operation. Used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRole {
    Payer,
    Payee,
    Destination,
    Source,
    /// Plain lookups (balance inquiry, history).
    Wallet,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountRole::Payer => "payer",
            AccountRole::Payee => "payee",
            AccountRole::Destination => "destination",
            AccountRole::Source => "source",
            AccountRole::Wallet => "wallet",
        };
        f.write_str(name)
    }
}

/// A balance-holding wallet owned by a user.
///
/// # Invariants
///
/// - `balance >= 0`; [`Account::debited`] refuses to go below zero
/// - `account_id` never changes once assigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,

    /// Identifier of the owning user (e.g. their email).
    pub owner_ref: String,

    pub balance: Amount,
}

impl Account {
    /// Creates a new account with a zero balance.
    pub fn new(account_id: AccountId, owner_ref: impl Into<String>) -> Self {
        Account {
            account_id,
            owner_ref: owner_ref.into(),
            balance: Amount::ZERO,
        }
    }

    /// Returns `true` if the balance covers `amount`.
    pub fn can_cover(&self, amount: Amount) -> bool {
        self.balance >= amount
    }

    /// Balance after adding `amount`.
    pub fn credited(&self, amount: Amount) -> Result<Amount> {
        self.balance.checked_add(amount).ok_or_else(|| {
            EngineError::InvalidOperation(format!(
                "amount {} overflows balance of account {}",
                amount, self.account_id
            ))
        })
    }

    /// Balance after removing `amount`. Fails with `InsufficientFunds` if it is not covered.
    pub fn debited(&self, amount: Amount) -> Result<Amount> {
        if !self.can_cover(amount) {
            return Err(EngineError::InsufficientFunds {
                account_id: self.account_id,
                balance: self.balance,
                requested: amount,
            });
        }

        self.balance.checked_sub(amount).ok_or_else(|| {
            EngineError::InvalidOperation(format!(
                "amount {} overflows balance of account {}",
                amount, self.account_id
            ))
        })
    }
}
