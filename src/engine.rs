//! Core transaction engine.
//!
//! The engine is the only writer of balances and ledger entries. Each operation
//! runs to completion inside one call: validate, lock the local accounts it
//! touches, talk to the external gateway if needed, commit the balance changes,
//! then append the ledger record. Failures never leave a partial change behind.
//!
//! # Ordering with the external system
//!
//! - Deposits are validated remotely before the local credit.
//! - Withdrawals debit locally only after the remote deposit reports
//!   `COMPLETED`. A crash between that confirmation and the local commit is
//!   not recovered; nothing here reconciles it.

use crate::account::{Account, AccountId, AccountRole};
use crate::amount::Amount;
use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, Result};
use crate::gateway::{DepositOrder, WalletGateway};
use crate::ledger::Ledger;
use crate::locks::AccountLocks;
use crate::store::{AccountStore, BalanceChange};
use crate::transaction::{
    Currency, Direction, ExternalTransfer, P2pTransfer, PendingTransaction, TransactionDetails,
    TransactionId, TransactionView,
};
use log::{debug, info, warn};
use parking_lot::Mutex;

/// Move funds between two local accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub payer: AccountId,
    pub payee: AccountId,
    pub amount: Amount,
    pub currency: Currency,
}

/// Bring funds in from an external wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub destination: AccountId,
    pub external_source: AccountId,
    pub amount: Amount,
    pub currency: Currency,
    pub external_reference: Option<String>,
}

/// Send funds out to an external wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub source: AccountId,
    pub external_destination: AccountId,
    pub amount: Amount,
    pub currency: Currency,
}

/// The transaction engine.
///
/// All methods take `&self`; share it between threads behind an `Arc`.
/// Operations that touch the same account are serialized by per-account locks.
pub struct TransactionEngine<S, G> {
    store: S,
    gateway: G,
    ledger: Ledger,
    locks: AccountLocks,
    registration: Mutex<()>,
    clock: Box<dyn Clock>,
}

impl<S: AccountStore, G: WalletGateway> TransactionEngine<S, G> {
    pub fn new(store: S, gateway: G) -> Self {
        Self::with_clock(store, gateway, Box::new(SystemClock))
    }

    pub fn with_clock(store: S, gateway: G, clock: Box<dyn Clock>) -> Self {
        TransactionEngine {
            store,
            gateway,
            ledger: Ledger::new(),
            locks: AccountLocks::new(),
            registration: Mutex::new(()),
            clock,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Opens the wallet of a newly registered owner. One wallet per owner.
    pub fn open_account(&self, owner_ref: &str) -> Result<Account> {
        let _registering = self.registration.lock();
        if let Some(existing) = self.store.find_by_owner(owner_ref) {
            return Err(EngineError::InvalidOperation(format!(
                "owner {} already has account {}",
                owner_ref, existing.account_id
            )));
        }

        let account = self.store.create(owner_ref);
        info!("Opened account {} for {}", account.account_id, owner_ref);
        Ok(account)
    }

    /// Current state of one account.
    pub fn account(&self, account_id: AccountId) -> Result<Account> {
        self.load(account_id, AccountRole::Wallet)
    }

    /// All accounts, sorted by account id.
    pub fn accounts(&self) -> Vec<Account> {
        self.store.all()
    }

    pub fn create_transfer(&self, request: TransferRequest) -> Result<TransactionView> {
        ensure_positive(request.amount)?;
        if request.payer == request.payee {
            return Err(EngineError::InvalidOperation(
                "payer and payee must differ".to_string(),
            ));
        }

        let locks = self.locks.set(&[request.payer, request.payee]);
        let _guards = locks.lock_all();

        let payer = self.load(request.payer, AccountRole::Payer)?;
        let payee = self.load(request.payee, AccountRole::Payee)?;
        let payer_balance = payer.debited(request.amount)?;
        let payee_balance = payee.credited(request.amount)?;

        self.store.commit(&[
            BalanceChange::new(&payer, payer_balance),
            BalanceChange::new(&payee, payee_balance),
        ])?;

        let transaction = self.ledger.append(PendingTransaction {
            amount: request.amount,
            currency: request.currency,
            created_at: self.clock.now(),
            details: TransactionDetails::P2p(P2pTransfer {
                payer: payer.account_id,
                payee: payee.account_id,
            }),
        });

        debug!(
            "Transferred {} {} from {} to {} (tx {})",
            request.amount, request.currency, payer.account_id, payee.account_id, transaction.id
        );
        Ok(transaction.view())
    }

    pub fn create_deposit(&self, request: DepositRequest) -> Result<TransactionView> {
        ensure_positive(request.amount)?;

        let locks = self.locks.set(&[request.destination]);
        let _guards = locks.lock_all();

        let destination = self.load(request.destination, AccountRole::Destination)?;
        let new_balance = destination.credited(request.amount)?;

        if let Err(e) = self
            .gateway
            .validate_sufficient_balance(request.external_source, request.amount)
        {
            warn!(
                "Deposit of {} into {} rejected by external wallet: {}",
                request.amount, destination.account_id, e
            );
            return Err(e.into());
        }

        self.store
            .commit(&[BalanceChange::new(&destination, new_balance)])?;

        let transaction = self.ledger.append(PendingTransaction {
            amount: request.amount,
            currency: request.currency,
            created_at: self.clock.now(),
            details: TransactionDetails::External(ExternalTransfer {
                direction: Direction::Inbound,
                internal_account: destination.account_id,
                external_cvu: request.external_source,
                external_reference: request.external_reference.unwrap_or_default(),
            }),
        });

        info!(
            "Deposited {} {} into {} from external {} (tx {})",
            request.amount,
            request.currency,
            destination.account_id,
            request.external_source,
            transaction.id
        );
        Ok(transaction.view())
    }

    pub fn create_withdrawal(&self, request: WithdrawalRequest) -> Result<TransactionView> {
        ensure_positive(request.amount)?;

        // held until the debit is committed
        let locks = self.locks.set(&[request.source]);
        let _guards = locks.lock_all();

        let source = self.load(request.source, AccountRole::Source)?;
        let new_balance = source.debited(request.amount)?;

        let validation = self
            .gateway
            .validate_account_exists(request.external_destination)?;
        let reference = validation
            .bank_name
            .unwrap_or_else(|| request.external_destination.to_string());

        let order = DepositOrder {
            destination: request.external_destination,
            amount: request.amount,
            currency: request.currency,
            reference: reference.clone(),
        };
        let receipt = self.gateway.initiate_deposit(&order)?;

        if !receipt.status.is_completed() {
            let message = receipt.message.as_deref().unwrap_or("Unknown error");
            warn!(
                "External deposit {} for withdrawal from {} not completed: {:?}",
                receipt.remote_transaction_id, source.account_id, receipt.status
            );
            return Err(EngineError::InvalidOperation(format!(
                "external deposit failed: {}",
                message
            )));
        }

        if let Err(e) = self
            .store
            .commit(&[BalanceChange::new(&source, new_balance)])
        {
            // remote side already moved the money; nothing here can undo it
            warn!(
                "External deposit {} completed but debit of {} failed: {}",
                receipt.remote_transaction_id, source.account_id, e
            );
            return Err(e);
        }

        let transaction = self.ledger.append(PendingTransaction {
            amount: request.amount,
            currency: request.currency,
            created_at: self.clock.now(),
            details: TransactionDetails::External(ExternalTransfer {
                direction: Direction::Outbound,
                internal_account: source.account_id,
                external_cvu: request.external_destination,
                external_reference: reference,
            }),
        });

        info!(
            "Withdrew {} {} from {} to external {} (tx {}, remote {})",
            request.amount,
            request.currency,
            source.account_id,
            request.external_destination,
            transaction.id,
            receipt.remote_transaction_id
        );
        Ok(transaction.view())
    }

    pub fn get_transaction(&self, id: TransactionId) -> Result<TransactionView> {
        self.ledger
            .get(id)
            .map(|t| t.view())
            .ok_or(EngineError::TransactionNotFound(id))
    }

    /// Every transaction of the account, newest first. Equal timestamps keep ledger order.
    pub fn get_history(&self, account_id: AccountId) -> Result<Vec<TransactionView>> {
        if !self.store.exists(account_id) {
            return Err(EngineError::AccountNotFound {
                role: AccountRole::Wallet,
                account_id,
            });
        }

        let mut history: Vec<_> = self
            .ledger
            .list_by_account(account_id)
            .iter()
            .map(|t| t.view())
            .collect();
        history.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.transaction_id.cmp(&b.transaction_id))
        });
        Ok(history)
    }

    fn load(&self, account_id: AccountId, role: AccountRole) -> Result<Account> {
        self.store
            .get(account_id)
            .ok_or(EngineError::AccountNotFound { role, account_id })
    }
}

fn ensure_positive(amount: Amount) -> Result<()> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidOperation(
            "amount must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::GatewayError;
    use crate::gateway::InMemoryWalletGateway;
    use crate::store::InMemoryAccountStore;
    use crate::transaction::{Party, TransactionKind};
    use chrono::{Duration, TimeZone, Utc};
    use std::str::FromStr;
    use std::sync::Arc;

    type Engine = TransactionEngine<InMemoryAccountStore, Arc<InMemoryWalletGateway>>;

    const EXTERNAL_SOURCE: AccountId = AccountId(555);
    const EXTERNAL_DESTINATION: AccountId = AccountId(888);

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn setup() -> (Engine, Arc<InMemoryWalletGateway>) {
        let gateway = Arc::new(InMemoryWalletGateway::new());
        gateway.open_account(EXTERNAL_SOURCE, "Banco Macro", amt("100000"));
        gateway.open_account(EXTERNAL_DESTINATION, "TEST_BANK", Amount::ZERO);
        let engine = TransactionEngine::new(InMemoryAccountStore::new(), Arc::clone(&gateway));
        (engine, gateway)
    }

    fn funded(engine: &Engine, owner: &str, balance: &str) -> AccountId {
        let account = engine.open_account(owner).unwrap();
        engine
            .create_deposit(deposit(account.account_id, balance))
            .unwrap();
        account.account_id
    }

    fn transfer(payer: AccountId, payee: AccountId, amount: &str) -> TransferRequest {
        TransferRequest {
            payer,
            payee,
            amount: amt(amount),
            currency: Currency::Ars,
        }
    }

    fn deposit(destination: AccountId, amount: &str) -> DepositRequest {
        DepositRequest {
            destination,
            external_source: EXTERNAL_SOURCE,
            amount: amt(amount),
            currency: Currency::Ars,
            external_reference: Some("Banco Macro".to_string()),
        }
    }

    fn withdrawal(source: AccountId, amount: &str) -> WithdrawalRequest {
        WithdrawalRequest {
            source,
            external_destination: EXTERNAL_DESTINATION,
            amount: amt(amount),
            currency: Currency::Ars,
        }
    }

    fn balance(engine: &Engine, id: AccountId) -> Amount {
        engine.account(id).unwrap().balance
    }

    #[test]
    fn test_open_account_rejects_second_wallet_for_owner() {
        let (engine, _) = setup();
        let first = engine.open_account("nacho@mail.com").unwrap();
        assert_eq!(first.account_id, AccountId(100_000_000_001));

        let err = engine.open_account("nacho@mail.com").unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperation(msg) if msg.contains("already has")));
        assert_eq!(engine.accounts().len(), 1);
    }

    #[test]
    fn test_transfer_moves_funds_and_records_p2p() {
        let (engine, _) = setup();
        let a = funded(&engine, "a@mail.com", "1000");
        let b = funded(&engine, "b@mail.com", "500");

        let view = engine.create_transfer(transfer(a, b, "100")).unwrap();

        assert_eq!(balance(&engine, a), amt("900"));
        assert_eq!(balance(&engine, b), amt("600"));
        assert_eq!(view.kind, TransactionKind::P2p);
        assert_eq!(view.payer, Party::Local(a));
        assert_eq!(view.payee, Party::Local(b));
        assert_eq!(view.amount, amt("100"));
        assert_eq!(engine.ledger().p2p().len(), 1);
    }

    #[test]
    fn test_transfer_validation_order() {
        let (engine, _) = setup();
        let a = funded(&engine, "a@mail.com", "10");

        // same-account check wins even with a valid balance
        let err = engine.create_transfer(transfer(a, a, "1")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperation(msg) if msg == "payer and payee must differ"));

        // amount check comes before everything else
        let err = engine.create_transfer(transfer(a, a, "0")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperation(msg) if msg == "amount must be positive"));

        let missing = AccountId(42);
        let err = engine.create_transfer(transfer(missing, a, "1")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::AccountNotFound { role: AccountRole::Payer, account_id } if account_id == missing
        ));
        let err = engine.create_transfer(transfer(a, missing, "1")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::AccountNotFound { role: AccountRole::Payee, .. }
        ));
        assert_eq!(balance(&engine, a), amt("10"));
    }

    #[test]
    fn test_transfer_insufficient_funds_changes_nothing() {
        let (engine, _) = setup();
        let a = funded(&engine, "a@mail.com", "1000");
        let b = funded(&engine, "b@mail.com", "500");

        let err = engine.create_transfer(transfer(a, b, "1100")).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { account_id, .. } if account_id == a));
        assert_eq!(balance(&engine, a), amt("1000"));
        assert_eq!(balance(&engine, b), amt("500"));
        assert!(engine.ledger().p2p().is_empty());
    }

    #[test]
    fn test_deposit_credits_after_external_validation() {
        let (engine, _) = setup();
        let a = engine.open_account("a@mail.com").unwrap().account_id;

        let view = engine.create_deposit(deposit(a, "200")).unwrap();

        assert_eq!(balance(&engine, a), amt("200"));
        assert_eq!(view.kind, TransactionKind::Deposit);
        assert_eq!(view.payer, Party::External(EXTERNAL_SOURCE));
        assert_eq!(view.payee, Party::Local(a));
        assert_eq!(view.external_reference.as_deref(), Some("Banco Macro"));
    }

    #[test]
    fn test_credit_overflow_is_rejected_before_commit() {
        let (engine, gateway) = setup();
        let whale = AccountId(777);
        gateway.open_account(whale, "Banco Nacion", amt("79228162514264337593543950335"));
        let a = engine.open_account("a@mail.com").unwrap().account_id;
        let b = engine.open_account("b@mail.com").unwrap().account_id;
        let huge = "50000000000000000000000000000";

        for id in [a, b] {
            let mut request = deposit(id, huge);
            request.external_source = whale;
            engine.create_deposit(request).unwrap();
        }

        let mut request = deposit(a, huge);
        request.external_source = whale;
        let err = engine.create_deposit(request).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperation(msg) if msg.contains("overflows balance")));

        let err = engine.create_transfer(transfer(a, b, huge)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperation(msg) if msg.contains("overflows balance")));

        assert_eq!(balance(&engine, a), amt(huge));
        assert_eq!(balance(&engine, b), amt(huge));
        assert_eq!(engine.ledger().external().len(), 2);
        assert!(engine.ledger().p2p().is_empty());
    }

    #[test]
    fn test_lock_table_is_empty_between_operations() {
        let (engine, _) = setup();
        let a = funded(&engine, "a@mail.com", "100");

        for i in 0..1_000 {
            let missing = AccountId(i);
            let _ = engine.create_transfer(transfer(a, missing, "1"));
            let _ = engine.create_deposit(deposit(missing, "1"));
            let _ = engine.create_withdrawal(withdrawal(missing, "1"));
        }
        engine.create_transfer(transfer(a, a, "1")).unwrap_err();
        engine.create_withdrawal(withdrawal(a, "1")).unwrap();

        assert_eq!(engine.locks.tracked(), 0);
    }

    #[test]
    fn test_deposit_external_failures_propagate_unchanged() {
        let (engine, gateway) = setup();
        let a = engine.open_account("a@mail.com").unwrap().account_id;

        let mut request = deposit(a, "200");
        request.external_source = AccountId(12345);
        let err = engine.create_deposit(request).unwrap_err();
        assert!(matches!(err, EngineError::Gateway(GatewayError::NotFound(id)) if id == AccountId(12345)));

        let err = engine.create_deposit(deposit(a, "100001")).unwrap_err();
        assert!(matches!(err, EngineError::Gateway(GatewayError::InsufficientFunds { .. })));

        gateway.set_unavailable(true);
        let err = engine.create_deposit(deposit(a, "200")).unwrap_err();
        assert!(matches!(err, EngineError::Gateway(GatewayError::Unavailable(_))));

        assert_eq!(balance(&engine, a), Amount::ZERO);
        assert!(engine.ledger().external().is_empty());
    }

    #[test]
    fn test_deposit_to_missing_account_never_calls_gateway() {
        let (engine, gateway) = setup();
        gateway.set_unavailable(true);
        let err = engine.create_deposit(deposit(AccountId(7), "1")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::AccountNotFound { role: AccountRole::Destination, .. }
        ));
    }

    #[test]
    fn test_withdrawal_debits_after_remote_confirmation() {
        let (engine, gateway) = setup();
        let a = funded(&engine, "a@mail.com", "1000");

        let view = engine.create_withdrawal(withdrawal(a, "100")).unwrap();

        assert_eq!(balance(&engine, a), amt("900"));
        assert_eq!(gateway.balance_of(EXTERNAL_DESTINATION), Some(amt("100")));
        assert_eq!(gateway.deposit_calls(), 1);
        assert_eq!(view.kind, TransactionKind::Withdrawal);
        assert_eq!(view.payer, Party::Local(a));
        assert_eq!(view.payee, Party::External(EXTERNAL_DESTINATION));
        assert_eq!(view.external_reference.as_deref(), Some("TEST_BANK"));
    }

    #[test]
    fn test_withdrawal_failed_remote_status_leaves_balance() {
        let (engine, gateway) = setup();
        let a = funded(&engine, "a@mail.com", "1000");
        gateway.fail_next_deposit("FAILED", None);

        let err = engine.create_withdrawal(withdrawal(a, "100")).unwrap_err();

        assert!(matches!(
            err,
            EngineError::InvalidOperation(ref msg) if msg == "external deposit failed: Unknown error"
        ));
        assert_eq!(balance(&engine, a), amt("1000"));
        assert_eq!(gateway.deposit_calls(), 1);
        assert_eq!(engine.get_history(a).unwrap().len(), 1);
    }

    #[test]
    fn test_withdrawal_insufficient_funds_skips_gateway() {
        let (engine, gateway) = setup();
        let a = funded(&engine, "a@mail.com", "50");

        let err = engine.create_withdrawal(withdrawal(a, "50.01")).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        assert_eq!(gateway.deposit_calls(), 0);

        // exact balance is allowed
        engine.create_withdrawal(withdrawal(a, "50")).unwrap();
        assert_eq!(balance(&engine, a), Amount::ZERO);
    }

    #[test]
    fn test_withdrawal_unknown_destination_never_deposits() {
        let (engine, gateway) = setup();
        let a = funded(&engine, "a@mail.com", "100");

        let mut request = withdrawal(a, "10");
        request.external_destination = AccountId(404);
        let err = engine.create_withdrawal(request).unwrap_err();

        assert!(matches!(err, EngineError::Gateway(GatewayError::NotFound(_))));
        assert_eq!(gateway.deposit_calls(), 0);
        assert_eq!(balance(&engine, a), amt("100"));
    }

    #[test]
    fn test_get_transaction_is_stable() {
        let (engine, _) = setup();
        let a = funded(&engine, "a@mail.com", "100");
        let history = engine.get_history(a).unwrap();
        let id = history[0].transaction_id;

        assert_eq!(engine.get_transaction(id).unwrap(), engine.get_transaction(id).unwrap());
        assert!(matches!(
            engine.get_transaction(TransactionId(999)),
            Err(EngineError::TransactionNotFound(TransactionId(999)))
        ));
    }

    #[test]
    fn test_history_newest_first_with_ledger_order_on_ties() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let gateway = Arc::new(InMemoryWalletGateway::new());
        gateway.open_account(EXTERNAL_SOURCE, "Banco Macro", amt("1000"));
        gateway.open_account(EXTERNAL_DESTINATION, "TEST_BANK", Amount::ZERO);
        let engine = TransactionEngine::with_clock(
            InMemoryAccountStore::new(),
            gateway,
            Box::new(Arc::clone(&clock)),
        );

        let a = engine.open_account("a@mail.com").unwrap().account_id;
        let b = engine.open_account("b@mail.com").unwrap().account_id;

        // same instant: ledger order
        engine.create_deposit(deposit(a, "75")).unwrap();
        engine.create_deposit(deposit(a, "50")).unwrap();
        let amounts: Vec<_> = engine
            .get_history(a)
            .unwrap()
            .iter()
            .map(|v| v.amount)
            .collect();
        assert_eq!(amounts, vec![amt("75"), amt("50")]);

        clock.advance(Duration::seconds(1));
        engine.create_transfer(transfer(a, b, "10")).unwrap();
        clock.advance(Duration::seconds(1));
        engine.create_withdrawal(withdrawal(a, "5")).unwrap();

        let history = engine.get_history(a).unwrap();
        let kinds: Vec<_> = history.iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionKind::Withdrawal,
                TransactionKind::P2p,
                TransactionKind::Deposit,
                TransactionKind::Deposit
            ]
        );
        assert!(history.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let for_b = engine.get_history(b).unwrap();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].payee, Party::Local(b));
    }

    #[test]
    fn test_history_of_missing_account() {
        let (engine, _) = setup();
        assert!(matches!(
            engine.get_history(AccountId(1)),
            Err(EngineError::AccountNotFound { .. })
        ));
    }
}
