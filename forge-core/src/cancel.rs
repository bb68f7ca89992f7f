//! Cooperative cancellation shared by chat streams and the container poller.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;

/// Cloneable cancellation signal. Every clone observes the same state; once
/// cancelled a token stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake every task waiting on this token.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled. Dropping the future unsubscribes.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Owned form of [`CancelToken::cancelled`] for hand-written `Stream` impls.
    pub fn cancelled_owned(self) -> BoxFuture<'static, ()> {
        Box::pin(async move { self.cancelled().await })
    }
}
