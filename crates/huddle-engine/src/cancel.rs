//! Caller-driven cancellation.
//!
//! A [`CancelSource`] is held by the caller; every engine operation takes a
//! [`CancelSignal`] and races its work against it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Triggers cancellation for every signal it handed out.
#[derive(Debug, Clone)]
pub struct CancelSource {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns a signal observing this source.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Cancels all operations holding a signal from this source.
    pub fn cancel(&self) {
        debug!("cancellation requested");
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observes a [`CancelSource`].
///
/// A source dropped without cancelling never cancels its signals.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        CancelSource::new().signal()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Source gone without cancelling.
                std::future::pending::<()>().await;
            }
        }
    }
}
