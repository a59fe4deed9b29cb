use tokio::sync::watch;

/// Creates a connected trigger/token pair.
pub fn cancel_pair() -> (CancelTrigger, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelTrigger { tx }, CancelToken { rx })
}

/// Fires the cancellation observed by every clone of the paired token.
#[derive(Debug)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

impl CancelTrigger {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// A cloneable, level-triggered cancellation signal.
///
/// Once cancelled it stays cancelled. Dropping the trigger without firing it
/// means the token never resolves.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the paired trigger fires.
    pub async fn cancelled(mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
