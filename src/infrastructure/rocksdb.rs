use crate::domain::account::{Account, AccountKey};
use crate::domain::ports::{RecordStore, Session, SessionBox};
use crate::domain::session::{SessionCore, SessionState, StagedWrite, Version};
use crate::domain::transfer::TransferRecord;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Column Family for storing account states.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for storing the transfer audit log.
pub const CF_TRANSFERS: &str = "transfers";

/// On-disk representation of an account together with its commit version.
#[derive(Debug, Serialize, Deserialize)]
struct StoredAccount {
    account: Account,
    version: Version,
}

/// A persistent record store implementation using RocksDB.
///
/// Accounts and audit records live in separate Column Families. A commit
/// validates the session's read set and then applies every staged write in a
/// single `WriteBatch`, so readers never see part of a transfer.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    // Serializes validate-and-write; reads never take it.
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("accounts" and "transfers") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_accounts = ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default());
        let cf_transfers = ColumnFamilyDescriptor::new(CF_TRANSFERS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_accounts, cf_transfers])?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }
}

fn handle<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name).ok_or_else(|| {
        TransferError::InternalError(Box::new(std::io::Error::other(format!(
            "{} column family not found",
            name
        ))))
    })
}

fn load_account(db: &DB, key: &AccountKey) -> Result<Option<StoredAccount>> {
    let cf = handle(db, CF_ACCOUNTS)?;
    match db.get_cf(cf, key.as_str().as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl RecordStore for RocksDBStore {
    async fn begin(&self) -> Result<SessionBox> {
        Ok(Box::new(RocksDBSession {
            db: Arc::clone(&self.db),
            commit_lock: Arc::clone(&self.commit_lock),
            core: SessionCore::new(),
        }))
    }

    async fn get(&self, key: &AccountKey) -> Result<Option<Account>> {
        Ok(load_account(&self.db, key)?.map(|stored| stored.account))
    }

    async fn put_account(&self, account: Account) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        let version = load_account(&self.db, &account.key)?.map_or(0, |s| s.version + 1);
        let cf = handle(&self.db, CF_ACCOUNTS)?;
        let key = account.key.as_str().as_bytes().to_vec();
        let value = serde_json::to_vec(&StoredAccount { account, version })?;
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        let cf = handle(&self.db, CF_ACCOUNTS)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let stored: StoredAccount = serde_json::from_slice(&value)?;
            accounts.push(stored.account);
        }
        Ok(accounts)
    }

    async fn transfers(&self) -> Result<Vec<TransferRecord>> {
        let cf = handle(&self.db, CF_TRANSFERS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

struct RocksDBSession {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
    core: SessionCore,
}

impl RocksDBSession {
    fn build_batch(&self) -> Result<WriteBatch> {
        let accounts = handle(&self.db, CF_ACCOUNTS)?;
        let transfers = handle(&self.db, CF_TRANSFERS)?;
        let mut batch = WriteBatch::default();

        for write in self.core.writes() {
            match write {
                StagedWrite::PutAccount(account) => {
                    let version =
                        load_account(&self.db, &account.key)?.map_or(0, |s| s.version + 1);
                    let value = serde_json::to_vec(&StoredAccount {
                        account: account.clone(),
                        version,
                    })?;
                    batch.put_cf(accounts, account.key.as_str().as_bytes(), value);
                }
                StagedWrite::AppendTransfer(record) => {
                    batch.put_cf(transfers, record.id.to_bytes(), serde_json::to_vec(record)?);
                }
            }
        }
        Ok(batch)
    }

    fn validate_and_write(&self) -> Result<()> {
        for (key, expectation) in self.core.expectations() {
            let current = load_account(&self.db, &key)?.map(|s| s.version);
            SessionCore::validate(&key, expectation, current)?;
        }
        let batch = self.build_batch()?;
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl Session for RocksDBSession {
    async fn read(&mut self, key: &AccountKey) -> Result<Account> {
        self.core.ensure_active()?;
        if let Some(account) = self.core.cached(key) {
            return Ok(account);
        }
        let stored = load_account(&self.db, key)?
            .ok_or_else(|| TransferError::AccountNotFound(key.clone()))?;
        self.core.record_read(stored.account.clone(), stored.version);
        Ok(stored.account)
    }

    fn stage(&mut self, write: StagedWrite) -> Result<()> {
        self.core.stage(write)
    }

    async fn commit(&mut self) -> Result<()> {
        self.core.ensure_active()?;
        let lock = Arc::clone(&self.commit_lock);
        let _guard = lock.lock().await;

        if let Err(e) = self.validate_and_write() {
            debug!(error = %e, "commit rejected");
            self.core.mark_aborted();
            return Err(e);
        }
        self.core.mark_committed()
    }

    async fn abort(&mut self) {
        self.core.mark_aborted();
    }

    fn state(&self) -> SessionState {
        self.core.state()
    }
}
