//! Cancellation with a cause

use crate::error::LifecycleError;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// A cancellation token paired with a write-once cause
///
/// The first call to [`Cancellation::cancel`] records its cause; later calls
/// cancel nothing new and leave the cause untouched.
#[derive(Debug, Clone)]
pub struct Cancellation {
    token: CancellationToken,
    cause: Arc<OnceLock<LifecycleError>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Cancellation {
    /// Create a cancellation scope, optionally as a child of `parent`
    ///
    /// Cancelling the parent cancels this scope, with no recorded cause.
    pub fn new(parent: Option<&CancellationToken>) -> Self {
        let token = match parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        Self {
            token,
            cause: Arc::new(OnceLock::new()),
        }
    }

    /// Cancel with `cause`
    ///
    /// Returns `true` when this call recorded the cause.
    pub fn cancel(&self, cause: LifecycleError) -> bool {
        let recorded = self.cause.set(cause).is_ok();
        self.token.cancel();
        recorded
    }

    /// Cancel without recording a cause
    pub(crate) fn close(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The recorded cause, if any
    pub fn cause(&self) -> Option<LifecycleError> {
        self.cause.get().cloned()
    }

    /// A handle to the underlying token, for cooperative cancellation in tasks
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolve once cancelled, yielding the cause
    ///
    /// A scope cancelled through its parent yields [`LifecycleError::Cancelled`].
    pub async fn cancelled(&self) -> LifecycleError {
        self.token.cancelled().await;
        self.cause().unwrap_or(LifecycleError::Cancelled)
    }
}
