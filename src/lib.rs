//! # Wallet Engine
//!
//! Keeps per-account balances and records value-moving operations: P2P
//! transfers between local accounts, deposits from an external wallet system,
//! and withdrawals to it.
//!
//! ## Design Principles
//!
//! - **Fixed-point arithmetic**: 2 decimal places via `rust_decimal`
//! - **No negative balances**: checked before and at commit time
//! - **Exactly-once mutation**: each operation commits its balance changes atomically,
//!   then appends one ledger record
//! - **Remote first for withdrawals**: the local debit happens only after the
//!   external deposit is confirmed
//!
//! ## Example
//!
//! ```
//! use std::str::FromStr;
//! use wallet_engine::{
//!     AccountId, Amount, Currency, DepositRequest, InMemoryAccountStore,
//!     InMemoryWalletGateway, TransactionEngine,
//! };
//!
//! let gateway = InMemoryWalletGateway::new();
//! gateway.open_account(AccountId(555), "Banco Macro", Amount::units(5000));
//!
//! let engine = TransactionEngine::new(InMemoryAccountStore::new(), gateway);
//! let account = engine.open_account("martina@mail.com").unwrap();
//! engine
//!     .create_deposit(DepositRequest {
//!         destination: account.account_id,
//!         external_source: AccountId(555),
//!         amount: Amount::from_str("1500").unwrap(),
//!         currency: Currency::Ars,
//!         external_reference: None,
//!     })
//!     .unwrap();
//!
//! assert_eq!(engine.account(account.account_id).unwrap().balance.to_string(), "1500.00");
//! ```

pub mod account;
pub mod amount;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod locks;
pub mod replay;
pub mod store;
pub mod transaction;

pub use account::{Account, AccountId, AccountRole};
pub use amount::Amount;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GatewayConfig;
pub use engine::{DepositRequest, TransactionEngine, TransferRequest, WithdrawalRequest};
pub use error::{EngineError, GatewayError, Result};
pub use gateway::{HttpWalletGateway, InMemoryWalletGateway, WalletGateway};
pub use ledger::Ledger;
pub use store::{AccountStore, InMemoryAccountStore};
pub use transaction::{
    Currency, Party, Transaction, TransactionId, TransactionKind, TransactionStatus,
    TransactionView,
};
