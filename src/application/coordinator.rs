use crate::domain::account::{Account, AccountKey, Amount};
use crate::domain::ports::{RecordStore, Session};
use crate::domain::session::StagedWrite;
use crate::domain::transfer::TransferRecord;
use crate::error::{Result, TransferError};
use rust_decimal::Decimal;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Runs the single supported transaction shape: debit one account, credit
/// another and append one audit record, committed or aborted as a unit.
///
/// The coordinator holds no lock of its own. Every attempt opens a fresh
/// session, reads the source balance through it and relies on the store's
/// commit-time validation to reject lost updates. Transient errors are
/// returned as-is; retrying is the job of [`RetryPolicy`](super::retry::RetryPolicy).
#[derive(Clone)]
pub struct TransferCoordinator {
    store: Arc<dyn RecordStore>,
}

impl TransferCoordinator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// Returns the committed `completed` audit record.
    pub async fn transfer(
        &self,
        from: &AccountKey,
        to: &AccountKey,
        amount: Decimal,
    ) -> Result<TransferRecord> {
        self.transfer_cancellable(from, to, amount, future::pending::<()>())
            .await
    }

    /// Like [`transfer`](Self::transfer), but gives up with
    /// [`TransferError::Cancelled`] if `cancel` completes before the commit
    /// is issued. Once the commit is issued the outcome is reported as is.
    pub async fn transfer_cancellable<C>(
        &self,
        from: &AccountKey,
        to: &AccountKey,
        amount: Decimal,
        cancel: C,
    ) -> Result<TransferRecord>
    where
        C: Future<Output = ()> + Send,
    {
        let amount = validate_request(from, to, amount)?;
        let failed_after_staging = AtomicBool::new(false);

        let result = self
            .attempt(from, to, amount, cancel, &failed_after_staging)
            .await;
        if result.is_err() && failed_after_staging.load(Ordering::SeqCst) {
            self.record_failure(from, to, amount).await;
        }
        result
    }

    /// One attempt with its own session, writing no `failed` record.
    ///
    /// Sets `failed_after_staging` when the attempt staged its writes and then
    /// failed for a reason other than a lost commit race. The session is gone
    /// by the time this returns.
    pub(crate) async fn attempt<C>(
        &self,
        from: &AccountKey,
        to: &AccountKey,
        amount: Amount,
        cancel: C,
        failed_after_staging: &AtomicBool,
    ) -> Result<TransferRecord>
    where
        C: Future<Output = ()> + Send,
    {
        tokio::pin!(cancel);

        let begun = until_cancelled(&mut cancel, self.store.begin()).await;
        let mut session = match begun {
            Some(session) => session?,
            None => return Err(TransferError::Cancelled),
        };

        let read = until_cancelled(&mut cancel, read_accounts(session.as_mut(), from, to, amount))
            .await;
        let (source, target) = match read {
            Some(Ok(accounts)) => accounts,
            Some(Err(e)) => {
                session.abort().await;
                return Err(fatal_if_misuse(e));
            }
            None => {
                session.abort().await;
                debug!(%from, %to, "transfer cancelled before commit");
                return Err(TransferError::Cancelled);
            }
        };

        // From here on the cancellation signal is no longer observed.
        let record = TransferRecord::completed(from.clone(), to.clone(), amount);
        let outcome = match stage_transfer(session.as_mut(), source, target, amount, &record) {
            Ok(()) => session.commit().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!(
                    id = %record.id,
                    %from,
                    %to,
                    amount = %record.amount,
                    "transfer committed"
                );
                Ok(record)
            }
            Err(e @ TransferError::Conflict(_)) => {
                session.abort().await;
                debug!(%from, %to, error = %e, "transfer lost commit race");
                Err(e)
            }
            Err(e) => {
                session.abort().await;
                failed_after_staging.store(true, Ordering::SeqCst);
                Err(fatal_if_misuse(e))
            }
        }
    }

    /// Appends a `failed` audit record in a separate session.
    ///
    /// Best-effort: errors are logged and dropped so the caller still sees
    /// the original failure.
    pub(crate) async fn record_failure(&self, from: &AccountKey, to: &AccountKey, amount: Amount) {
        let record = TransferRecord::failed(from.clone(), to.clone(), amount);
        let id = record.id;

        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(e) => {
                warn!(%id, error = %e, "could not open session for failed-transfer record");
                return;
            }
        };
        let result = match session.stage(StagedWrite::AppendTransfer(record)) {
            Ok(()) => session.commit().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            session.abort().await;
            warn!(%id, error = %e, "failed-transfer record was not written");
        }
    }
}

pub(crate) fn validate_request(from: &AccountKey, to: &AccountKey, amount: Decimal) -> Result<Amount> {
    if from == to {
        return Err(TransferError::InvalidArgument(format!(
            "source and destination are the same account: {}",
            from
        )));
    }
    Amount::new(amount)
}

/// Reads both accounts through the session and checks the source covers
/// `amount`. Nothing is staged here.
async fn read_accounts(
    session: &mut dyn Session,
    from: &AccountKey,
    to: &AccountKey,
    amount: Amount,
) -> Result<(Account, Account)> {
    let source = session.read(from).await?;
    if !source.covers(amount) {
        debug!(account = %from, balance = %source.balance, %amount, "insufficient balance");
        return Err(TransferError::InsufficientBalance {
            account: source.key,
            balance: source.balance,
            requested: amount.value(),
        });
    }
    let target = session.read(to).await?;
    Ok((source, target))
}

fn stage_transfer(
    session: &mut dyn Session,
    mut source: Account,
    mut target: Account,
    amount: Amount,
    record: &TransferRecord,
) -> Result<()> {
    source.debit(amount)?;
    target.credit(amount);
    session.stage(StagedWrite::PutAccount(source))?;
    session.stage(StagedWrite::PutAccount(target))?;
    session.stage(StagedWrite::AppendTransfer(record.clone()))
}

/// Session misuse is a bug in this crate, never an outcome of the inputs.
fn fatal_if_misuse(e: TransferError) -> TransferError {
    if let TransferError::InvalidSessionState { .. } = e {
        error!(error = %e, "session used after it reached a terminal state");
        debug_assert!(false, "{}", e);
    }
    e
}

/// Polls `fut` until it completes or `cancel` fires, whichever comes first.
async fn until_cancelled<C, F>(cancel: &mut Pin<&mut C>, fut: F) -> Option<F::Output>
where
    C: Future<Output = ()>,
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.as_mut() => None,
        out = fut => Some(out),
    }
}
