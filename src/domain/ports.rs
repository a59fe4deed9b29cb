use super::account::{Account, AccountKey};
use super::session::{SessionState, StagedWrite};
use super::transfer::TransferRecord;
use crate::error::Result;
use async_trait::async_trait;

/// An isolation boundary binding reads and staged writes into one atomic unit.
///
/// A session is owned by the call that opened it and is never shared across
/// tasks. Dropping an active session discards its staged writes.
#[async_trait]
pub trait Session: Send {
    /// Reads an account through the session, recording the version observed.
    async fn read(&mut self, key: &AccountKey) -> Result<Account>;

    /// Records an intended write. Nothing becomes visible until `commit`.
    fn stage(&mut self, write: StagedWrite) -> Result<()>;

    /// Makes every staged write visible at once, or none of them.
    async fn commit(&mut self) -> Result<()>;

    /// Discards staged writes. No-op on a terminal session.
    async fn abort(&mut self);

    fn state(&self) -> SessionState;
}

pub type SessionBox = Box<dyn Session>;

/// Key-addressed account records plus the append-only transfer log.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Opens a new session.
    async fn begin(&self) -> Result<SessionBox>;

    /// Unscoped read of the latest committed state of an account.
    async fn get(&self, key: &AccountKey) -> Result<Option<Account>>;

    /// Creates or replaces an account outside any session (account management).
    async fn put_account(&self, account: Account) -> Result<()>;

    async fn accounts(&self) -> Result<Vec<Account>>;

    /// Committed audit records, in no particular order.
    async fn transfers(&self) -> Result<Vec<TransferRecord>>;
}

pub type RecordStoreBox = Box<dyn RecordStore>;
