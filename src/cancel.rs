//! Cooperative cancellation of in-flight calls.

use std::sync::Arc;
use tokio::sync::watch;

/// A clonable handle that cancels every call it was passed to.
///
/// Cancelling interrupts both an outstanding transport call and a pending
/// retry wait. The call then fails with [`Error::Cancelled`](crate::Error::Cancelled).
///
/// Dropping the future returned by the client also stops the call; the token
/// is for callers that want the cancellation reported as a value.
///
/// # Examples
///
/// ```
/// use fetchkit::CancelToken;
///
/// let token = CancelToken::new();
/// let for_task = token.clone();
/// assert!(!for_task.is_cancelled());
///
/// token.cancel();
/// assert!(for_task.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Cancels all calls holding this token. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Completes once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender outlives `receiver`, so this only returns on cancellation.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Completes when `token` is cancelled; never completes without a token.
pub(crate) async fn cancelled(token: Option<&CancelToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
