//! Batch replay of wallet operations from CSV.
//!
//! Input columns: `type,account,counterparty,amount,currency,reference`.
//!
//! | type | account | counterparty | amount | reference |
//! |---|---|---|---|---|
//! | `open` | | | | owner |
//! | `external` | remote CVU | | remote balance | bank name |
//! | `transfer` | payer | payee | amount | |
//! | `deposit` | destination | external source | amount | external reference |
//! | `withdrawal` | source | external destination | amount | |
//!
//! `currency` is optional and defaults to ARS. Rows are processed in order;
//! rejected rows are logged at warn level and skipped.

use crate::account::{Account, AccountId};
use crate::amount::Amount;
use crate::engine::{DepositRequest, TransactionEngine, TransferRequest, WithdrawalRequest};
use crate::error::{EngineError, Result};
use crate::gateway::{InMemoryWalletGateway, WalletGateway};
use crate::store::AccountStore;
use crate::transaction::{Currency, TransactionView};
use csv::{ReaderBuilder, Trim};
use log::{debug, warn};
use serde::Deserialize;
use std::io::{Read, Write};
use std::str::FromStr;

/// Raw operation row as read from CSV.
#[derive(Debug, Deserialize)]
pub struct OperationRecord {
    #[serde(rename = "type")]
    pub op_type: String,
    pub account: Option<String>,
    pub counterparty: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Open {
        owner_ref: String,
    },
    /// Registers a remote account in the offline gateway.
    External {
        cvu: AccountId,
        bank_name: String,
        balance: Amount,
    },
    Transfer(TransferRequest),
    Deposit(DepositRequest),
    Withdrawal(WithdrawalRequest),
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl OperationRecord {
    /// Parses the raw CSV row into a typed operation.
    pub fn parse(&self) -> std::result::Result<Operation, String> {
        let op_type = self.op_type.trim().to_lowercase();

        match op_type.as_str() {
            "open" => Ok(Operation::Open {
                owner_ref: self.reference()?.to_string(),
            }),
            "external" => Ok(Operation::External {
                cvu: self.account()?,
                bank_name: present(&self.reference).unwrap_or_default().to_string(),
                balance: self.amount()?,
            }),
            "transfer" => Ok(Operation::Transfer(TransferRequest {
                payer: self.account()?,
                payee: self.counterparty()?,
                amount: self.amount()?,
                currency: self.currency()?,
            })),
            "deposit" => Ok(Operation::Deposit(DepositRequest {
                destination: self.account()?,
                external_source: self.counterparty()?,
                amount: self.amount()?,
                currency: self.currency()?,
                external_reference: present(&self.reference).map(str::to_string),
            })),
            "withdrawal" => Ok(Operation::Withdrawal(WithdrawalRequest {
                source: self.account()?,
                external_destination: self.counterparty()?,
                amount: self.amount()?,
                currency: self.currency()?,
            })),
            other => Err(format!("unknown operation type '{}'", other)),
        }
    }

    fn account(&self) -> std::result::Result<AccountId, String> {
        parse_id("account", &self.account)
    }

    fn counterparty(&self) -> std::result::Result<AccountId, String> {
        parse_id("counterparty", &self.counterparty)
    }

    fn amount(&self) -> std::result::Result<Amount, String> {
        let raw = present(&self.amount).ok_or("missing amount")?;
        Amount::from_str(raw).map_err(|e| format!("invalid amount '{}': {}", raw, e))
    }

    fn currency(&self) -> std::result::Result<Currency, String> {
        present(&self.currency).map_or(Ok(Currency::default()), Currency::from_str)
    }

    fn reference(&self) -> std::result::Result<&str, String> {
        present(&self.reference).ok_or_else(|| "missing reference".to_string())
    }
}

fn parse_id(column: &str, field: &Option<String>) -> std::result::Result<AccountId, String> {
    let raw = present(field).ok_or_else(|| format!("missing {}", column))?;
    AccountId::from_str(raw).map_err(|e| format!("invalid {} '{}': {}", column, raw, e))
}

/// Counts of processed rows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Replays every row of `reader` against `engine`.
///
/// `external` is the offline gateway, if any; `external` rows are rejected without one.
pub fn process_csv<R, S, G>(
    engine: &TransactionEngine<S, G>,
    external: Option<&InMemoryWalletGateway>,
    reader: R,
) -> Result<ReplaySummary>
where
    R: Read,
    S: AccountStore,
    G: WalletGateway,
{
    let mut csv_reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut summary = ReplaySummary::default();

    for (row_idx, result) in csv_reader.deserialize::<OperationRecord>().enumerate() {
        let row = row_idx + 2; // 1-indexed, accounting for header row

        let outcome = result
            .map_err(EngineError::from)
            .and_then(|record| {
                record
                    .parse()
                    .map_err(|message| EngineError::InvalidRecord { row, message })
            })
            .and_then(|operation| apply(engine, external, operation));

        match outcome {
            Ok(()) => {
                debug!("Row {}: applied", row);
                summary.applied += 1;
            }
            Err(e) => {
                warn!("Row {}: {}", row, e);
                summary.rejected += 1;
            }
        }
    }

    Ok(summary)
}

fn apply<S, G>(
    engine: &TransactionEngine<S, G>,
    external: Option<&InMemoryWalletGateway>,
    operation: Operation,
) -> Result<()>
where
    S: AccountStore,
    G: WalletGateway,
{
    match operation {
        Operation::Open { owner_ref } => {
            engine.open_account(&owner_ref)?;
        }
        Operation::External {
            cvu,
            bank_name,
            balance,
        } => match external {
            Some(gateway) => gateway.open_account(cvu, bank_name, balance),
            None => {
                return Err(EngineError::InvalidOperation(format!(
                    "cannot register external account {} against a live gateway",
                    cvu
                )))
            }
        },
        Operation::Transfer(request) => {
            engine.create_transfer(request)?;
        }
        Operation::Deposit(request) => {
            engine.create_deposit(request)?;
        }
        Operation::Withdrawal(request) => {
            engine.create_withdrawal(request)?;
        }
    }
    Ok(())
}

/// Writes account states to CSV, in the order given.
pub fn write_accounts<W: Write>(accounts: &[Account], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["account", "owner", "balance"])?;

    for account in accounts {
        csv_writer.write_record([
            account.account_id.to_string(),
            account.owner_ref.clone(),
            account.balance.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Writes a transaction history to CSV.
pub fn write_history<W: Write>(history: &[TransactionView], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "id",
        "type",
        "amount",
        "currency",
        "status",
        "created_at",
        "payer",
        "payee",
    ])?;

    for view in history {
        csv_writer.write_record([
            view.transaction_id.to_string(),
            view.kind.to_string(),
            view.amount.to_string(),
            view.currency.to_string(),
            view.status.to_string(),
            view.created_at.to_rfc3339(),
            view.payer.to_string(),
            view.payee.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}
