#![allow(dead_code)]

use async_trait::async_trait;
use atomic_transfer::domain::account::{Account, AccountKey, Balance};
use atomic_transfer::domain::ports::{RecordStore, Session, SessionBox};
use atomic_transfer::domain::session::{SessionState, StagedWrite};
use atomic_transfer::domain::transfer::{TransferRecord, TransferStatus};
use atomic_transfer::error::{Result, TransferError};
use atomic_transfer::infrastructure::in_memory::InMemoryRecordStore;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Barrier;

pub async fn seeded_store(balances: &[(&str, Decimal)]) -> InMemoryRecordStore {
    let store = InMemoryRecordStore::new();
    seed(&store, balances).await;
    store
}

pub async fn seed(store: &dyn RecordStore, balances: &[(&str, Decimal)]) {
    for (key, balance) in balances {
        store
            .put_account(Account::new(*key, Balance::new(*balance)))
            .await
            .unwrap();
    }
}

pub async fn balance_of(store: &dyn RecordStore, key: &str) -> Balance {
    store
        .get(&AccountKey::from(key))
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("account {} missing", key))
        .balance
}

pub async fn count_records(store: &dyn RecordStore, status: TransferStatus) -> usize {
    store
        .transfers()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.status == status)
        .count()
}

/// Delegates to an in-memory store and lets tests replace `commit`.
///
/// `on_commit` learns whether the session staged account writes, which
/// separates transfer sessions from the ones appending `failed` records.
struct Wrapped<F> {
    inner: SessionBox,
    moves_funds: bool,
    on_commit: F,
}

#[async_trait]
impl<F> Session for Wrapped<F>
where
    F: FnMut(bool) -> Option<TransferError> + Send,
{
    async fn read(&mut self, key: &AccountKey) -> Result<Account> {
        self.inner.read(key).await
    }

    fn stage(&mut self, write: StagedWrite) -> Result<()> {
        if let StagedWrite::PutAccount(_) = write {
            self.moves_funds = true;
        }
        self.inner.stage(write)
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(e) = (self.on_commit)(self.moves_funds) {
            self.inner.abort().await;
            return Err(e);
        }
        self.inner.commit().await
    }

    async fn abort(&mut self) {
        self.inner.abort().await
    }

    fn state(&self) -> SessionState {
        self.inner.state()
    }
}

/// A store whose commits always lose the optimistic race.
#[derive(Clone, Default)]
pub struct ConflictingStore {
    pub inner: InMemoryRecordStore,
    pub begins: Arc<AtomicUsize>,
}

#[async_trait]
impl RecordStore for ConflictingStore {
    async fn begin(&self) -> Result<SessionBox> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.begin().await?;
        Ok(Box::new(Wrapped {
            inner,
            moves_funds: false,
            on_commit: |_: bool| Some(TransferError::Conflict(AccountKey::from("A"))),
        }))
    }

    async fn get(&self, key: &AccountKey) -> Result<Option<Account>> {
        self.inner.get(key).await
    }

    async fn put_account(&self, account: Account) -> Result<()> {
        self.inner.put_account(account).await
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        self.inner.accounts().await
    }

    async fn transfers(&self) -> Result<Vec<TransferRecord>> {
        self.inner.transfers().await
    }
}

/// A store whose next `failures` commits fail at the storage level.
#[derive(Clone, Default)]
pub struct FlakyCommitStore {
    pub inner: InMemoryRecordStore,
    pub failures: Arc<AtomicUsize>,
    transfers_only: bool,
}

impl FlakyCommitStore {
    pub fn failing(failures: usize) -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            failures: Arc::new(AtomicUsize::new(failures)),
            transfers_only: false,
        }
    }

    /// Only sessions that move funds fail; `failed` records still land.
    pub fn failing_transfers(failures: usize) -> Self {
        Self {
            transfers_only: true,
            ..Self::failing(failures)
        }
    }

    pub fn with_store(mut self, inner: InMemoryRecordStore) -> Self {
        self.inner = inner;
        self
    }
}

#[async_trait]
impl RecordStore for FlakyCommitStore {
    async fn begin(&self) -> Result<SessionBox> {
        let inner = self.inner.begin().await?;
        let failures = Arc::clone(&self.failures);
        let transfers_only = self.transfers_only;
        Ok(Box::new(Wrapped {
            inner,
            moves_funds: false,
            on_commit: move |moves_funds: bool| {
                if transfers_only && !moves_funds {
                    return None;
                }
                failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .ok()
                    .map(|_| TransferError::SessionUnavailable("disk full".into()))
            },
        }))
    }

    async fn get(&self, key: &AccountKey) -> Result<Option<Account>> {
        self.inner.get(key).await
    }

    async fn put_account(&self, account: Account) -> Result<()> {
        self.inner.put_account(account).await
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        self.inner.accounts().await
    }

    async fn transfers(&self) -> Result<Vec<TransferRecord>> {
        self.inner.transfers().await
    }
}

/// Holds the commits of the first `gated` sessions until all of them are
/// ready to commit, forcing their reads to overlap.
#[derive(Clone)]
pub struct GatedStore {
    pub inner: InMemoryRecordStore,
    gated: Arc<AtomicUsize>,
    barrier: Arc<Barrier>,
}

impl GatedStore {
    pub fn new(inner: InMemoryRecordStore, gated: usize) -> Self {
        Self {
            inner,
            gated: Arc::new(AtomicUsize::new(gated)),
            barrier: Arc::new(Barrier::new(gated)),
        }
    }
}

struct GatedSession {
    inner: SessionBox,
    barrier: Option<Arc<Barrier>>,
}

#[async_trait]
impl Session for GatedSession {
    async fn read(&mut self, key: &AccountKey) -> Result<Account> {
        self.inner.read(key).await
    }

    fn stage(&mut self, write: StagedWrite) -> Result<()> {
        self.inner.stage(write)
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(barrier) = self.barrier.take() {
            barrier.wait().await;
        }
        self.inner.commit().await
    }

    async fn abort(&mut self) {
        self.inner.abort().await
    }

    fn state(&self) -> SessionState {
        self.inner.state()
    }
}

#[async_trait]
impl RecordStore for GatedStore {
    async fn begin(&self) -> Result<SessionBox> {
        let inner = self.inner.begin().await?;
        let gate = self
            .gated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(Box::new(GatedSession {
            inner,
            barrier: gate.then(|| Arc::clone(&self.barrier)),
        }))
    }

    async fn get(&self, key: &AccountKey) -> Result<Option<Account>> {
        self.inner.get(key).await
    }

    async fn put_account(&self, account: Account) -> Result<()> {
        self.inner.put_account(account).await
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        self.inner.accounts().await
    }

    async fn transfers(&self) -> Result<Vec<TransferRecord>> {
        self.inner.transfers().await
    }
}

pub fn write_accounts_csv(path: &Path, balances: &[(&str, &str)]) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["account", "balance"])?;
    for (account, balance) in balances {
        wtr.write_record([*account, *balance])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_transfers_csv(path: &Path, rows: &[(&str, &str, &str)]) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["from", "to", "amount"])?;
    for (from, to, amount) in rows {
        wtr.write_record([*from, *to, *amount])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `rows` transfers moving one unit around a ring of `accounts` accounts.
pub fn generate_ring_csv(path: &Path, accounts: usize, rows: usize) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["from", "to", "amount"])?;
    for i in 0..rows {
        let from = format!("acc{}", i % accounts);
        let to = format!("acc{}", (i + 1) % accounts);
        wtr.write_record([from.as_str(), to.as_str(), "1"])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn generate_ring_accounts(path: &Path, accounts: usize, balance: &str) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["account", "balance"])?;
    for i in 0..accounts {
        wtr.write_record([format!("acc{}", i).as_str(), balance])?;
    }
    wtr.flush()?;
    Ok(())
}
