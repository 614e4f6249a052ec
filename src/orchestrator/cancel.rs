//! Cooperative cancellation for in-flight requests

use tokio::sync::watch;

/// Caller-side handle; cancelling it aborts the paired request
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a handle and the token the request observes
    pub fn new() -> (Self, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, Cancellation { rx: Some(rx) })
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Request-side token
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    /// A token that is never cancelled
    pub fn never() -> Self {
        Cancellation { rx: None }
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map_or(false, |rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested; never resolves otherwise
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };

        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling
                return std::future::pending().await;
            }
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::never()
    }
}
