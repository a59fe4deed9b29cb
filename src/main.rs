use atomic_transfer::application::engine::TransferEngine;
use atomic_transfer::application::retry::{RetryConfig, RetryPolicy};
use atomic_transfer::domain::ports::{RecordStore, RecordStoreBox};
use atomic_transfer::infrastructure::in_memory::InMemoryRecordStore;
#[cfg(feature = "storage-rocksdb")]
use atomic_transfer::infrastructure::rocksdb::RocksDBStore;
use atomic_transfer::interfaces::csv::account_reader::AccountReader;
use atomic_transfer::interfaces::csv::account_writer::AccountWriter;
use atomic_transfer::interfaces::csv::audit_writer::AuditWriter;
use atomic_transfer::interfaces::csv::transfer_reader::{TransferReader, TransferRequest};
use atomic_transfer::logging::init_logging;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinSet;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input CSV of transfer requests (`from,to,amount`)
    input: PathBuf,

    /// CSV of opening balances (`account,balance`) loaded before any transfer
    #[arg(long)]
    accounts: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Attempts per transfer, including the first one
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Comma-separated waits between attempts, in milliseconds
    #[arg(long, value_delimiter = ',', default_values_t = [10u64, 50, 100])]
    backoff_ms: Vec<u64>,

    /// Limit on concurrently open sessions (in-memory storage only)
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Submit all transfers at once instead of one after another
    #[arg(long)]
    concurrent: bool,

    /// Write the committed audit log to this CSV file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn open_store(cli: &Cli) -> Result<RecordStoreBox> {
    if let Some(db_path) = &cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            return Ok(Box::new(store));
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        {
            let _ = db_path;
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }

    let store = match cli.max_sessions {
        Some(max) => InMemoryRecordStore::with_max_sessions(max),
        None => InMemoryRecordStore::new(),
    };
    Ok(Box::new(store))
}

fn report(request: &TransferRequest, result: atomic_transfer::error::Result<()>) {
    if let Err(e) = result {
        eprintln!(
            "Error processing transfer {} -> {} ({}): [{}] {}",
            request.from,
            request.to,
            request.amount,
            e.code(),
            e
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let backoff = cli
        .backoff_ms
        .iter()
        .map(|ms| Duration::from_millis(*ms))
        .collect();
    let config = RetryConfig::new(cli.max_attempts, backoff).into_diagnostic()?;
    let policy = RetryPolicy::new(config).into_diagnostic()?;

    let store = open_store(&cli)?;
    if let Some(path) = &cli.accounts {
        let file = File::open(path).into_diagnostic()?;
        for account in AccountReader::new(file).accounts() {
            let account = account.into_diagnostic()?;
            store.put_account(account).await.into_diagnostic()?;
        }
    }
    let engine = TransferEngine::new(store, policy);

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = TransferReader::new(file);
    let mut tasks = JoinSet::new();
    for request in reader.requests() {
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                eprintln!("Error reading transfer: {}", e);
                continue;
            }
        };

        if cli.concurrent {
            let engine = engine.clone();
            tasks.spawn(async move {
                let result = engine
                    .transfer(&request.from, &request.to, request.amount)
                    .await
                    .map(drop);
                report(&request, result);
            });
        } else {
            let result = engine
                .transfer(&request.from, &request.to, request.amount)
                .await
                .map(drop);
            report(&request, result);
        }
    }
    while let Some(joined) = tasks.join_next().await {
        joined.into_diagnostic()?;
    }

    if let Some(path) = &cli.audit_log {
        let records = engine.audit_log().await.into_diagnostic()?;
        let file = File::create(path).into_diagnostic()?;
        AuditWriter::new(file)
            .write_records(&records)
            .into_diagnostic()?;
    }

    let accounts = engine.accounts().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(accounts).into_diagnostic()?;

    Ok(())
}
