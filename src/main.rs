//! Wallet Engine CLI
//!
//! Replays a CSV of wallet operations and prints the final account states,
//! or the history of one account.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv --offline > accounts.csv
//! cargo run -- operations.csv --history 100000000001
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity
//! - `WALLET_GATEWAY_URL`, `WALLET_GATEWAY_CONNECT_TIMEOUT_MS`,
//!   `WALLET_GATEWAY_TIMEOUT_MS`: external wallet service (ignored with `--offline`)

use clap::Parser;
use log::info;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use wallet_engine::replay::{process_csv, write_accounts, write_history};
use wallet_engine::{
    AccountId, AccountStore, GatewayConfig, HttpWalletGateway, InMemoryAccountStore,
    InMemoryWalletGateway, Result, TransactionEngine, WalletGateway,
};

#[derive(Debug, Parser)]
#[command(name = "wallet-engine", version, about = "Replay wallet operations from CSV")]
struct Cli {
    /// Operations file (type,account,counterparty,amount,currency,reference)
    input: PathBuf,

    /// Use an in-memory external wallet instead of the HTTP service
    #[arg(long)]
    offline: bool,

    /// Print the transaction history of this account instead of all balances
    #[arg(long, value_name = "ACCOUNT")]
    history: Option<u64>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let file = File::open(&cli.input)?;
    let reader = BufReader::new(file);

    if cli.offline {
        let gateway = Arc::new(InMemoryWalletGateway::new());
        let engine = TransactionEngine::new(InMemoryAccountStore::new(), Arc::clone(&gateway));
        replay(&engine, Some(&*gateway), reader, cli.history)
    } else {
        let config = GatewayConfig::from_env()?;
        info!("Using external wallet service at {}", config.base_url);
        let gateway = HttpWalletGateway::new(&config)?;
        let engine = TransactionEngine::new(InMemoryAccountStore::new(), gateway);
        replay(&engine, None, reader, cli.history)
    }
}

fn replay<S, G, R>(
    engine: &TransactionEngine<S, G>,
    external: Option<&InMemoryWalletGateway>,
    reader: R,
    history: Option<u64>,
) -> Result<()>
where
    S: AccountStore,
    G: WalletGateway,
    R: Read,
{
    let summary = process_csv(engine, external, reader)?;
    info!(
        "Replay finished: {} applied, {} rejected",
        summary.applied, summary.rejected
    );

    let stdout = io::stdout();
    let handle = stdout.lock();
    match history {
        Some(account) => write_history(&engine.get_history(AccountId(account))?, handle),
        None => write_accounts(&engine.accounts(), handle),
    }
}
