//! Graceful shutdown on OS signals

use super::Cancellation;
use crate::error::{LifecycleError, Result};
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::signal;

/// One-shot interrupt listener
///
/// The listener is handed the [`Cancellation`] it should trigger rather than
/// reaching for process-wide state, and it installs at most once per
/// instance. The first signal cancels the application with
/// [`LifecycleError::Signal`] as the cause; the listener then exits and is
/// not re-armed. It also exits quietly if the application is cancelled for
/// another reason first.
#[derive(Debug, Default)]
pub struct GracefulSignalListener {
    installed: AtomicBool,
}

impl GracefulSignalListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Listen for Ctrl+C / SIGINT (and SIGTERM on unix)
    ///
    /// Returns `Ok(false)` if a listener was already installed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error outside a tokio runtime; the listener
    /// stays uninstalled and a later call may succeed.
    pub fn install(&self, cancellation: Cancellation) -> Result<bool> {
        self.install_with(cancellation, shutdown_signal())
    }

    /// Listen on a custom signal source
    ///
    /// `signal` resolves with a description of the signal that arrived.
    pub fn install_with<S>(&self, cancellation: Cancellation, signal: S) -> Result<bool>
    where
        S: Future<Output = io::Result<String>> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|err| {
            LifecycleError::configuration(format!("signal listener needs a tokio runtime: {err}"))
        })?;

        if self.installed.swap(true, Ordering::SeqCst) {
            tracing::warn!("Graceful shutdown listener already installed");
            return Ok(false);
        }

        let token = cancellation.token();
        runtime.spawn(async move {
            tokio::select! {
                received = signal => match received {
                    Ok(description) => {
                        tracing::info!(signal = %description, "Received shutdown signal");
                        cancellation.cancel(LifecycleError::Signal(description));
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "Failed to listen for shutdown signals");
                    }
                },
                () = token.cancelled() => {
                    tracing::debug!("Signal listener stopped");
                }
            }
        });

        Ok(true)
    }
}

/// Resolve when a shutdown signal (Ctrl+C or SIGTERM) is received
///
/// Yields the signal's name.
pub async fn shutdown_signal() -> io::Result<String> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    let terminate = async move {
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        received = signal::ctrl_c() => received.map(|()| "interrupt".to_string()),
        () = terminate => Ok("terminated".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_signal_cancels_with_description() {
        let cancellation = Cancellation::default();
        let listener = GracefulSignalListener::new();
        let (tx, rx) = oneshot::channel::<()>();

        assert!(
            listener
                .install_with(cancellation.clone(), async move {
                    let _ = rx.await;
                    Ok("interrupt".to_string())
                })
                .unwrap()
        );

        tx.send(()).unwrap();

        let cause = tokio::time::timeout(Duration::from_secs(5), cancellation.cancelled())
            .await
            .unwrap();
        assert!(matches!(cause, LifecycleError::Signal(ref s) if s == "interrupt"));
    }

    #[tokio::test]
    async fn test_duplicate_install_is_rejected() {
        let cancellation = Cancellation::default();
        let listener = GracefulSignalListener::new();

        assert!(listener.install_with(cancellation.clone(), std::future::pending()).unwrap());
        assert!(!listener.install_with(cancellation.clone(), std::future::pending()).unwrap());
        assert!(listener.is_installed());

        cancellation.cancel(LifecycleError::Stopped("done".into()));
    }

    #[tokio::test]
    async fn test_listener_exits_when_cancelled_elsewhere() {
        let cancellation = Cancellation::default();
        let listener = GracefulSignalListener::new();
        let (_tx, rx) = oneshot::channel::<()>();

        listener
            .install_with(cancellation.clone(), async move {
                let _ = rx.await;
                Ok("interrupt".to_string())
            })
            .unwrap();

        cancellation.cancel(LifecycleError::Stopped("explicit".into()));
        tokio::task::yield_now().await;

        assert!(matches!(
            cancellation.cause(),
            Some(LifecycleError::Stopped(ref reason)) if reason == "explicit"
        ));
    }

    #[test]
    fn test_install_outside_runtime_is_rejected() {
        let listener = GracefulSignalListener::new();

        let err = listener
            .install_with(Cancellation::default(), std::future::pending())
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Configuration(_)));
        assert!(!listener.is_installed());
    }
}
