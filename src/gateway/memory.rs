//! In-memory stand-in for the external wallet system.
//!
//! Holds a set of remote accounts with bank names and balances. Outages and
//! failed deposits can be scripted, and every `initiate_deposit` call is
//! counted so callers can check it ran at most once.

use super::{
    BalanceValidation, CvuValidation, DepositOrder, DepositReceipt, DepositStatus, GatewayResult,
    WalletGateway,
};
use crate::account::AccountId;
use crate::amount::Amount;
use crate::error::GatewayError;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct RemoteAccount {
    bank_name: String,
    balance: Amount,
}

#[derive(Debug, Clone)]
struct ScriptedFailure {
    status: String,
    message: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, RemoteAccount>,
    unavailable: bool,
    next_deposit_failure: Option<ScriptedFailure>,
    deposit_calls: usize,
    receipts_issued: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryWalletGateway {
    state: Mutex<State>,
}

impl InMemoryWalletGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a remote account.
    pub fn open_account(&self, cvu: AccountId, bank_name: impl Into<String>, balance: Amount) {
        self.state.lock().accounts.insert(
            cvu,
            RemoteAccount {
                bank_name: bank_name.into(),
                balance,
            },
        );
    }

    pub fn balance_of(&self, cvu: AccountId) -> Option<Amount> {
        self.state.lock().accounts.get(&cvu).map(|a| a.balance)
    }

    /// While set, every call fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// The next deposit answers with `status` instead of `COMPLETED` and moves no funds.
    pub fn fail_next_deposit(&self, status: impl Into<String>, message: Option<&str>) {
        self.state.lock().next_deposit_failure = Some(ScriptedFailure {
            status: status.into(),
            message: message.map(str::to_string),
        });
    }

    pub fn deposit_calls(&self) -> usize {
        self.state.lock().deposit_calls
    }
}

impl State {
    fn ensure_available(&self) -> GatewayResult<()> {
        if self.unavailable {
            return Err(GatewayError::Unavailable(
                "external wallet service is down".to_string(),
            ));
        }
        Ok(())
    }

    fn account(&self, cvu: AccountId) -> GatewayResult<&RemoteAccount> {
        self.accounts.get(&cvu).ok_or(GatewayError::NotFound(cvu))
    }
}

impl WalletGateway for InMemoryWalletGateway {
    fn validate_account_exists(&self, cvu: AccountId) -> GatewayResult<CvuValidation> {
        let state = self.state.lock();
        state.ensure_available()?;
        let account = state.account(cvu)?;

        Ok(CvuValidation {
            cvu,
            bank_name: Some(account.bank_name.clone()),
        })
    }

    fn validate_sufficient_balance(
        &self,
        cvu: AccountId,
        amount: Amount,
    ) -> GatewayResult<BalanceValidation> {
        let state = self.state.lock();
        state.ensure_available()?;
        let account = state.account(cvu)?;

        if account.balance < amount {
            return Err(GatewayError::InsufficientFunds { cvu, amount });
        }

        Ok(BalanceValidation {
            cvu,
            balance: Some(account.balance),
        })
    }

    fn initiate_deposit(&self, order: &DepositOrder) -> GatewayResult<DepositReceipt> {
        let mut state = self.state.lock();
        state.deposit_calls += 1;
        state.ensure_available()?;
        state.account(order.destination)?;

        state.receipts_issued += 1;
        let remote_transaction_id = format!("EXT-{}", state.receipts_issued);

        if let Some(failure) = state.next_deposit_failure.take() {
            return Ok(DepositReceipt {
                remote_transaction_id,
                status: DepositStatus::parse(&failure.status),
                message: failure.message,
            });
        }

        if let Some(account) = state.accounts.get_mut(&order.destination) {
            account.balance = account.balance.checked_add(order.amount).ok_or_else(|| {
                GatewayError::Unavailable(format!(
                    "deposit of {} overflows external account {}",
                    order.amount, order.destination
                ))
            })?;
        }

        Ok(DepositReceipt {
            remote_transaction_id,
            status: DepositStatus::Completed,
            message: None,
        })
    }
}
