//! Lifecycle handle
//!
//! Ties together the cancellation scope, the task supervisor, the shutdown
//! coordinator and the event bus of one application.

use super::{Cancellation, GracefulSignalListener, ShutdownCoordinator, ShutdownHook, TaskSupervisor};
use crate::config::Options;
use crate::error::{LifecycleError, Result};
use crate::event::{EventBus, EventHandler};
use crate::logger::LogLevel;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Inner {
    app_name: String,
    graceful_shutdown: bool,
    cancellation: Cancellation,
    supervisor: TaskSupervisor,
    coordinator: ShutdownCoordinator,
    events: EventBus,
    signals: GracefulSignalListener,
}

/// Cloneable handle to an application's lifecycle
///
/// Providers receive it through the build context; it can be moved into
/// background tasks to register hooks, spawn more work or stop the
/// application later on.
///
/// # Example
///
/// ```rust,ignore
/// let lifecycle = app.lifecycle().clone();
///
/// lifecycle.run_task("consumer", |token| async move {
///     consume_until(token).await
/// });
///
/// lifecycle.on_shutdown("consumer", |_| async move {
///     flush_offsets().await
/// })?;
/// ```
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

impl Lifecycle {
    /// Create the lifecycle described by `options`
    ///
    /// With `graceful_shutdown` set, the signal listener is installed right
    /// away when a tokio runtime is running, and otherwise on the first
    /// `builds` or `wait`.
    pub fn new(options: &Options) -> Self {
        let events = EventBus::with_handlers(options.event_handlers.clone())
            .with_log_level(options.log_level);
        let cancellation = Cancellation::new(options.parent.as_ref());

        let lifecycle = Self {
            inner: Arc::new(Inner {
                app_name: options.app_name.clone(),
                graceful_shutdown: options.graceful_shutdown,
                supervisor: TaskSupervisor::new(cancellation.clone(), events.clone()),
                coordinator: ShutdownCoordinator::new(events.clone(), options.hook_timeout),
                cancellation,
                events,
                signals: GracefulSignalListener::new(),
            }),
        };

        lifecycle.arm_signal_listener();
        lifecycle
    }

    pub fn app_name(&self) -> &str {
        &self.inner.app_name
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Attach an observer
    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        self.inner.events.register(handler);
    }

    /// Register a teardown step; hooks run in reverse registration order
    ///
    /// # Errors
    ///
    /// Returns a configuration error once shutdown has begun.
    #[track_caller]
    pub fn on_shutdown<F, Fut>(&self, name: impl Into<String>, hook: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.coordinator.on_shutdown(name, hook)
    }

    /// Register a [`ShutdownHook`] implementation
    #[track_caller]
    pub fn on_shutdown_hook<T: ShutdownHook>(&self, name: impl Into<String>, hook: Arc<T>) -> Result<()> {
        self.inner.coordinator.on_shutdown_hook(name, hook)
    }

    /// Spawn a supervised background task
    ///
    /// See [`TaskSupervisor::run_task`].
    pub fn run_task<F, Fut>(&self, name: impl Into<String>, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.supervisor.run_task(name, task);
    }

    /// The application's cancellation token
    pub fn token(&self) -> CancellationToken {
        self.inner.cancellation.token()
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.inner.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancellation.is_cancelled()
    }

    /// The first cancellation cause, if any
    pub fn cause(&self) -> Option<LifecycleError> {
        self.inner.cancellation.cause()
    }

    /// Cancel the application with `cause`
    ///
    /// Returns `true` if this call recorded the cause.
    pub fn cancel(&self, cause: LifecycleError) -> bool {
        self.inner.cancellation.cancel(cause)
    }

    /// Request a stop; [`Lifecycle::wait`] then returns [`LifecycleError::Stopped`]
    pub fn stop(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        tracing::info!(app = %self.inner.app_name, reason = %reason, "Stop requested");
        self.cancel(LifecycleError::Stopped(reason))
    }

    /// Install the interrupt listener
    ///
    /// Returns `Ok(false)` if it was already installed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when called outside a tokio runtime.
    pub fn enable_graceful_shutdown(&self) -> Result<bool> {
        self.inner
            .signals
            .install(self.inner.cancellation.clone())
    }

    /// Whether the interrupt listener is running
    pub fn is_listening_for_signals(&self) -> bool {
        self.inner.signals.is_installed()
    }

    /// Install the listener requested through the options, if still missing
    pub(crate) fn arm_signal_listener(&self) {
        if !self.inner.graceful_shutdown || self.is_listening_for_signals() || self.is_cancelled() {
            return;
        }
        if let Err(err) = self.enable_graceful_shutdown() {
            tracing::debug!(error = %err, "Signal listener deferred until a runtime is available");
        }
    }

    /// Publish a log event, if `level` passes the configured minimum
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.inner.events.log(level, message);
    }

    /// Wait for cancellation or for every task to finish, then shut down
    ///
    /// Returns the cancellation cause (a signal, a failed task, an explicit
    /// stop) when there is one. Otherwise returns the outcome of the
    /// shutdown hooks.
    pub async fn wait(&self) -> Result<()> {
        self.arm_signal_listener();
        let outcome = self.inner.supervisor.wait().await;
        // Normal completion still cancels, so lingering listeners exit.
        self.inner.cancellation.close();

        let shutdown = self.run_shutdown().await;
        match outcome {
            Err(cause) => {
                if let Err(err) = &shutdown {
                    tracing::error!(error = %err, "Shutdown hooks failed after cancellation");
                }
                Err(cause)
            }
            Ok(()) => shutdown,
        }
    }

    /// Stop the application and run the shutdown sequence
    ///
    /// Safe to call concurrently and repeatedly: hooks run once and every
    /// caller gets the same result.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.is_cancelled() {
            self.stop("shutdown requested");
        }
        self.run_shutdown().await
    }

    /// Number of background tasks still running
    pub fn active_tasks(&self) -> usize {
        self.inner.supervisor.active_tasks()
    }

    pub fn hook_count(&self) -> usize {
        self.inner.coordinator.hook_count()
    }

    pub(crate) async fn run_shutdown(&self) -> Result<()> {
        let cause = self.cause();
        if !self.inner.coordinator.is_started() {
            let message = match &cause {
                Some(cause) => format!("Shutting down ({cause}) ..."),
                None => "Shutting down ...".to_string(),
            };
            self.log(LogLevel::Info, message);
        }

        self.inner
            .coordinator
            .shutdown(cause)
            .await
            .map_err(LifecycleError::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_without_tasks_runs_hooks() {
        let lifecycle = Lifecycle::new(&Options::default());
        let ran = Arc::new(Mutex::new(false));

        let flag = Arc::clone(&ran);
        lifecycle
            .on_shutdown("flag", move |_| async move {
                *flag.lock().unwrap() = true;
                Ok(())
            })
            .unwrap();

        lifecycle.wait().await.unwrap();
        assert!(*ran.lock().unwrap());
        assert!(lifecycle.is_cancelled());
        assert!(lifecycle.cause().is_none());
    }

    #[tokio::test]
    async fn test_wait_returns_hook_aggregate_on_clean_exit() {
        let lifecycle = Lifecycle::new(&Options::default());
        lifecycle
            .on_shutdown("broken", |_| async { Err(anyhow::anyhow!("cannot close")) })
            .unwrap();

        let err = lifecycle.wait().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Shutdown(ref agg) if agg.len() == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_task_failure_surfaces_from_wait() {
        let lifecycle = Lifecycle::new(&Options::default());

        lifecycle.run_task("server", |token| async move {
            token.cancelled().await;
            Ok(())
        });
        lifecycle.run_task("poller", |_| async {
            Err(anyhow::anyhow!("upstream gone"))
        });

        let err = tokio::time::timeout(Duration::from_secs(5), lifecycle.wait())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Task { ref name, .. } if name == "poller"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_and_shutdown_race() {
        let lifecycle = Lifecycle::new(&Options::default());
        let runs = Arc::new(Mutex::new(0));

        let counter = Arc::clone(&runs);
        lifecycle
            .on_shutdown("once", move |_| async move {
                *counter.lock().unwrap() += 1;
                Err(anyhow::anyhow!("hook failed"))
            })
            .unwrap();
        lifecycle.run_task("server", |token| async move {
            token.cancelled().await;
            Ok(())
        });

        let waiter = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.wait().await })
        };
        let stopper = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.shutdown().await })
        };
        let direct = lifecycle.shutdown().await;

        let waited = waiter.await.unwrap();
        let stopped = stopper.await.unwrap();

        assert_eq!(*runs.lock().unwrap(), 1);
        assert!(matches!(waited, Err(LifecycleError::Stopped(_))));
        assert_eq!(
            stopped.unwrap_err().to_string(),
            direct.unwrap_err().to_string()
        );
    }

    #[tokio::test]
    async fn test_parent_token_cancels_application() {
        let parent = CancellationToken::new();
        let lifecycle = Lifecycle::new(&Options {
            parent: Some(parent.clone()),
            ..Options::default()
        });
        lifecycle.run_task("server", |token| async move {
            token.cancelled().await;
            Ok(())
        });

        parent.cancel();

        assert!(matches!(
            lifecycle.wait().await,
            Err(LifecycleError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_log_respects_level() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn EventHandler> = Arc::new(move |event: &Event| {
            if let Event::Log { message, .. } = event {
                sink.lock().unwrap().push(message.clone());
            }
        });
        let lifecycle = Lifecycle::new(&Options {
            log_level: LogLevel::Warn,
            event_handlers: vec![handler],
            ..Options::default()
        });

        lifecycle.log(LogLevel::Info, "quiet");
        lifecycle.log(LogLevel::Error, "loud");

        assert_eq!(*seen.lock().unwrap(), vec!["loud"]);
    }

    #[tokio::test]
    async fn test_task_failure_log_is_filtered_by_level() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Arc<dyn EventHandler> = Arc::new(move |event: &Event| {
            if let Event::Log { level, .. } = event {
                sink.lock().unwrap().push(*level);
            }
        });
        let lifecycle = Lifecycle::new(&Options {
            log_level: LogLevel::Error,
            event_handlers: vec![handler],
            ..Options::default()
        });

        lifecycle.run_task("poller", |_| async { Err(anyhow::anyhow!("upstream gone")) });
        let _ = lifecycle.wait().await;

        // The "Shutting down" info line is filtered; the task failure is not.
        assert_eq!(*seen.lock().unwrap(), vec![LogLevel::Error]);
    }

    #[test]
    fn test_graceful_shutdown_outside_runtime_is_deferred() {
        let lifecycle = Lifecycle::new(&Options {
            graceful_shutdown: true,
            ..Options::default()
        });
        assert!(!lifecycle.is_listening_for_signals());
        assert!(matches!(
            lifecycle.enable_graceful_shutdown(),
            Err(LifecycleError::Configuration(_))
        ));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            lifecycle.run_task("server", |token| async move {
                token.cancelled().await;
                Ok(())
            });
            let waiter = {
                let lifecycle = lifecycle.clone();
                tokio::spawn(async move { lifecycle.wait().await })
            };
            for _ in 0..100 {
                if lifecycle.is_listening_for_signals() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert!(lifecycle.is_listening_for_signals());

            lifecycle.stop("test finished");
            assert!(matches!(
                waiter.await.unwrap(),
                Err(LifecycleError::Stopped(_))
            ));
        });
    }
}
