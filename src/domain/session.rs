//! Backend-independent session bookkeeping.
//!
//! Every store keeps one `SessionCore` per open session. It tracks the state
//! machine (`Active` -> `Committed` | `Aborted`), the read set with the record
//! versions observed, and the writes staged so far. Stores only add the parts
//! that touch storage: loading a record and validating/applying at commit.

use super::account::{Account, AccountKey};
use super::transfer::TransferRecord;
use crate::error::{Result, TransferError};
use std::collections::HashMap;
use std::fmt;

/// Monotonic per-record version, bumped on every committed write.
pub type Version = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Committed,
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Active => "active",
            SessionState::Committed => "committed",
            SessionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// A write recorded in a session, invisible until commit.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedWrite {
    PutAccount(Account),
    AppendTransfer(TransferRecord),
}

/// Expected state of a key at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// The key was read at this version and must not have moved.
    Unchanged(Version),
    /// The key was written without being read; it only has to exist.
    Exists,
}

#[derive(Debug)]
pub struct SessionCore {
    state: SessionState,
    reads: HashMap<AccountKey, (Account, Version)>,
    writes: Vec<StagedWrite>,
}

impl Default for SessionCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCore {
    pub fn new() -> Self {
        Self {
            state: SessionState::Active,
            reads: HashMap::new(),
            writes: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.state == SessionState::Active {
            Ok(())
        } else {
            Err(TransferError::InvalidSessionState {
                expected: SessionState::Active,
                actual: self.state,
            })
        }
    }

    /// Returns the session's own view of `key`, if it has one.
    ///
    /// A staged put wins over the snapshot so a session reads its own writes.
    pub fn cached(&self, key: &AccountKey) -> Option<Account> {
        self.writes
            .iter()
            .rev()
            .find_map(|write| match write {
                StagedWrite::PutAccount(account) if &account.key == key => Some(account.clone()),
                _ => None,
            })
            .or_else(|| self.reads.get(key).map(|(account, _)| account.clone()))
    }

    /// Records the version observed by the first read of `account`.
    pub fn record_read(&mut self, account: Account, version: Version) {
        self.reads
            .entry(account.key.clone())
            .or_insert((account, version));
    }

    pub fn stage(&mut self, write: StagedWrite) -> Result<()> {
        self.ensure_active()?;
        self.writes.push(write);
        Ok(())
    }

    pub fn writes(&self) -> &[StagedWrite] {
        &self.writes
    }

    /// Keys the commit must validate, with what each one must satisfy.
    ///
    /// Keys that were read carry their observed version; keys that were only
    /// written carry a deferred existence check.
    pub fn expectations(&self) -> Vec<(AccountKey, Expectation)> {
        let mut expected: Vec<(AccountKey, Expectation)> = self
            .reads
            .iter()
            .map(|(key, (_, version))| (key.clone(), Expectation::Unchanged(*version)))
            .collect();

        for write in &self.writes {
            if let StagedWrite::PutAccount(account) = write
                && !self.reads.contains_key(&account.key)
                && !expected.iter().any(|(key, _)| key == &account.key)
            {
                expected.push((account.key.clone(), Expectation::Exists));
            }
        }

        // Stable order keeps validation deterministic across backends.
        expected.sort_by(|a, b| a.0.cmp(&b.0));
        expected
    }

    /// Checks one expectation against the version currently stored.
    pub fn validate(
        key: &AccountKey,
        expectation: Expectation,
        current: Option<Version>,
    ) -> Result<()> {
        match (expectation, current) {
            (_, None) => Err(TransferError::AccountNotFound(key.clone())),
            (Expectation::Unchanged(seen), Some(now)) if seen != now => {
                Err(TransferError::Conflict(key.clone()))
            }
            _ => Ok(()),
        }
    }

    pub fn mark_committed(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = SessionState::Committed;
        self.writes.clear();
        Ok(())
    }

    /// Discards staged writes. Terminal sessions are left untouched.
    ///
    /// Returns whether this call performed the transition.
    pub fn mark_aborted(&mut self) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        self.state = SessionState::Aborted;
        self.writes.clear();
        self.reads.clear();
        true
    }
}
