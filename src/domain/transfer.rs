use super::account::{AccountKey, Amount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// System-assigned identifier of an audit record.
///
/// ULIDs sort by creation time, which keeps audit keys roughly chronological
/// in ordered stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(Ulid);

impl TransferId {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        self.0.to_bytes()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Completed,
    Failed,
}

/// Immutable audit entry describing one transfer attempt.
///
/// A `Completed` record is only ever written in the same session as the two
/// balance mutations it describes.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct TransferRecord {
    pub id: TransferId,
    pub from_account: AccountKey,
    pub to_account: AccountKey,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    pub status: TransferStatus,
}

impl TransferRecord {
    pub fn completed(from: AccountKey, to: AccountKey, amount: Amount) -> Self {
        Self::new(from, to, amount, TransferStatus::Completed)
    }

    pub fn failed(from: AccountKey, to: AccountKey, amount: Amount) -> Self {
        Self::new(from, to, amount, TransferStatus::Failed)
    }

    fn new(from: AccountKey, to: AccountKey, amount: Amount, status: TransferStatus) -> Self {
        Self {
            id: TransferId::generate(),
            from_account: from,
            to_account: to,
            amount,
            timestamp: Utc::now(),
            status,
        }
    }

    /// Whether the record references `key` as source or destination.
    pub fn involves(&self, key: &AccountKey) -> bool {
        &self.from_account == key || &self.to_account == key
    }
}
