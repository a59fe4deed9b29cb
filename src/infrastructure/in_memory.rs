use crate::domain::account::{Account, AccountKey};
use crate::domain::ports::{RecordStore, Session, SessionBox};
use crate::domain::session::{SessionCore, SessionState, StagedWrite, Version};
use crate::domain::transfer::TransferRecord;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::debug;

#[derive(Debug, Clone)]
struct VersionedAccount {
    account: Account,
    version: Version,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountKey, VersionedAccount>,
    transfers: Vec<TransferRecord>,
}

/// A thread-safe in-memory record store with optimistic sessions.
///
/// Uses `Arc<RwLock<..>>` so clones share the same data. Reads only take the
/// read lock; a commit takes the write lock just long enough to validate the
/// session's read set and apply its writes.
#[derive(Default, Clone)]
pub struct InMemoryRecordStore {
    state: Arc<RwLock<State>>,
    sessions: Option<Arc<Semaphore>>,
}

impl InMemoryRecordStore {
    /// Creates a new, empty store with no limit on open sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that refuses to open more than `max` concurrent sessions.
    pub fn with_max_sessions(max: usize) -> Self {
        Self {
            state: Arc::default(),
            sessions: Some(Arc::new(Semaphore::new(max))),
        }
    }

    fn acquire_permit(&self) -> Result<Option<OwnedSemaphorePermit>> {
        match &self.sessions {
            None => Ok(None),
            Some(sessions) => sessions
                .clone()
                .try_acquire_owned()
                .map(Some)
                .map_err(|_| TransferError::SessionUnavailable("session capacity reached".into())),
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn begin(&self) -> Result<SessionBox> {
        let permit = self.acquire_permit()?;
        Ok(Box::new(InMemorySession {
            state: Arc::clone(&self.state),
            core: SessionCore::new(),
            _permit: permit,
        }))
    }

    async fn get(&self, key: &AccountKey) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(key).map(|v| v.account.clone()))
    }

    async fn put_account(&self, account: Account) -> Result<()> {
        let mut state = self.state.write().await;
        let version = state
            .accounts
            .get(&account.key)
            .map_or(0, |existing| existing.version + 1);
        state
            .accounts
            .insert(account.key.clone(), VersionedAccount { account, version });
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        let state = self.state.read().await;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .map(|v| v.account.clone())
            .collect();
        accounts.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(accounts)
    }

    async fn transfers(&self) -> Result<Vec<TransferRecord>> {
        let state = self.state.read().await;
        Ok(state.transfers.clone())
    }
}

struct InMemorySession {
    state: Arc<RwLock<State>>,
    core: SessionCore,
    // Held for the session's lifetime; released on drop.
    _permit: Option<OwnedSemaphorePermit>,
}

#[async_trait]
impl Session for InMemorySession {
    async fn read(&mut self, key: &AccountKey) -> Result<Account> {
        self.core.ensure_active()?;
        if let Some(account) = self.core.cached(key) {
            return Ok(account);
        }

        let state = self.state.read().await;
        let versioned = state
            .accounts
            .get(key)
            .cloned()
            .ok_or_else(|| TransferError::AccountNotFound(key.clone()))?;
        drop(state);

        self.core
            .record_read(versioned.account.clone(), versioned.version);
        Ok(versioned.account)
    }

    fn stage(&mut self, write: StagedWrite) -> Result<()> {
        self.core.stage(write)
    }

    async fn commit(&mut self) -> Result<()> {
        self.core.ensure_active()?;
        let mut state = self.state.write().await;

        for (key, expectation) in self.core.expectations() {
            let current = state.accounts.get(&key).map(|v| v.version);
            if let Err(e) = SessionCore::validate(&key, expectation, current) {
                debug!(account = %key, error = %e, "commit rejected");
                self.core.mark_aborted();
                return Err(e);
            }
        }

        for write in self.core.writes() {
            match write {
                StagedWrite::PutAccount(account) => {
                    let version = state
                        .accounts
                        .get(&account.key)
                        .map_or(0, |existing| existing.version + 1);
                    state.accounts.insert(
                        account.key.clone(),
                        VersionedAccount {
                            account: account.clone(),
                            version,
                        },
                    );
                }
                StagedWrite::AppendTransfer(record) => state.transfers.push(record.clone()),
            }
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
