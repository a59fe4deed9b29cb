use super::cancel::CancelToken;
use super::coordinator::{TransferCoordinator, validate_request};
use super::retry::RetryPolicy;
use crate::domain::account::{Account, AccountKey};
use crate::domain::ports::{RecordStore, RecordStoreBox};
use crate::domain::transfer::TransferRecord;
use crate::error::{Result, TransferError};
use rust_decimal::Decimal;
use std::future::{self, Future};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The caller-facing entry point for moving funds.
///
/// `TransferEngine` composes the retry policy around the coordinator, so each
/// retry is a complete new attempt with a fresh session and a fresh balance
/// read. It is cheap to clone and safe to share between tasks.
#[derive(Clone)]
pub struct TransferEngine {
    coordinator: TransferCoordinator,
    policy: RetryPolicy,
}

impl TransferEngine {
    /// Creates a new `TransferEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - The record store holding accounts and the audit log.
    /// * `policy` - How transient failures are retried.
    pub fn new(store: RecordStoreBox, policy: RetryPolicy) -> Self {
        Self::with_shared_store(Arc::from(store), policy)
    }

    pub fn with_shared_store(store: Arc<dyn RecordStore>, policy: RetryPolicy) -> Self {
        Self {
            coordinator: TransferCoordinator::new(store),
            policy,
        }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.coordinator.store()
    }

    /// Transfers `amount` from `from` to `to`, retrying transient failures.
    ///
    /// However many attempts it takes, one call leaves at most one `failed`
    /// audit record, and none if it eventually succeeds.
    pub async fn transfer(
        &self,
        from: &AccountKey,
        to: &AccountKey,
        amount: Decimal,
    ) -> Result<TransferRecord> {
        self.run(from, to, amount, future::pending::<()>, future::pending::<()>())
            .await
    }

    /// Like [`transfer`](Self::transfer), but gives up once `cancel` fires.
    ///
    /// An attempt that has not issued its commit yet is aborted, a pending
    /// backoff wait is cut short and no further attempts are made. A commit
    /// already issued is reported as is.
    pub async fn transfer_cancellable(
        &self,
        from: &AccountKey,
        to: &AccountKey,
        amount: Decimal,
        cancel: &CancelToken,
    ) -> Result<TransferRecord> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        self.run(
            from,
            to,
            amount,
            || cancel.clone().cancelled(),
            cancel.clone().cancelled(),
        )
        .await
    }

    async fn run<C, G>(
        &self,
        from: &AccountKey,
        to: &AccountKey,
        amount: Decimal,
        per_attempt: G,
        during_backoff: C,
    ) -> Result<TransferRecord>
    where
        G: Fn() -> C,
        C: Future<Output = ()> + Send,
    {
        let amount = validate_request(from, to, amount)?;
        let failed_after_staging = AtomicBool::new(false);

        let result = self
            .policy
            .run_cancellable(
                |_| {
                    self.coordinator
                        .attempt(from, to, amount, per_attempt(), &failed_after_staging)
                },
                during_backoff,
            )
            .await;

        if result.is_err() && failed_after_staging.load(Ordering::SeqCst) {
            self.coordinator.record_failure(from, to, amount).await;
        }
        result
    }

    /// Final state of all accounts, ordered by key.
    pub async fn accounts(&self) -> Result<Vec<Account>> {
        let mut accounts = self.store().accounts().await?;
        accounts.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(accounts)
    }

    /// Committed audit records naming `key` on either side, oldest first.
    pub async fn history(&self, key: &AccountKey) -> Result<Vec<TransferRecord>> {
        let mut records = self.audit_log().await?;
        records.retain(|r| r.involves(key));
        Ok(records)
    }

    /// Committed audit records sorted chronologically.
    pub async fn audit_log(&self) -> Result<Vec<TransferRecord>> {
        let mut records = self.store().transfers().await?;
        records.sort_by_key(|r| (r.timestamp, r.id));
        Ok(records)
    }
}
