//! Shutdown coordination
//!
//! Hooks are registered in setup order and torn down in **reverse order**, so a
//! resource is always released before the resources it depends on. The
//! sequence runs exactly once per application; every trigger after the first
//! waits for it and observes the same result.

use crate::error::{AggregateError, LifecycleError, Result, panic_message};
use crate::event::{Event, EventBus};
use crate::logger::LogLevel;
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::panic::{AssertUnwindSafe, Location};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A teardown step run during shutdown
///
/// The token passed to the hook is cancelled when the hook timeout (if one
/// is configured) expires. By then the hook's own future has already been
/// dropped, so the token only reaches work the hook handed it to, such as a
/// task it spawned.
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_bootstrap::lifecycle::ShutdownHook;
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl ShutdownHook for DatabasePool {
///     async fn on_shutdown(&self, _token: CancellationToken) -> anyhow::Result<()> {
///         self.close().await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ShutdownHook: Send + Sync + 'static {
    async fn on_shutdown(&self, token: CancellationToken) -> anyhow::Result<()>;
}

type HookFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send>;
type Outcome = std::result::Result<(), AggregateError>;
type ShutdownRun = Shared<BoxFuture<'static, Outcome>>;

struct RegisteredHook {
    name: String,
    location: &'static Location<'static>,
    hook: HookFn,
}

#[derive(Default)]
struct Registry {
    hooks: Vec<RegisteredHook>,
    run: Option<ShutdownRun>,
}

struct Sequence {
    events: EventBus,
    hook_timeout: Option<Duration>,
}

/// Ordered shutdown hook registry with run-once semantics
///
/// The sequence runs on its own task once started. Dropping a caller's
/// [`ShutdownCoordinator::shutdown`] future stops the wait, not the hooks.
pub struct ShutdownCoordinator {
    registry: Mutex<Registry>,
    sequence: Arc<Sequence>,
}

impl ShutdownCoordinator {
    /// Create a coordinator publishing to `events`
    ///
    /// With `hook_timeout` set, each hook is abandoned once the limit expires
    /// and reported as [`LifecycleError::HookTimedOut`]. Without it, a hook
    /// that never returns blocks the shutdown sequence.
    pub fn new(events: EventBus, hook_timeout: Option<Duration>) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            sequence: Arc::new(Sequence {
                events,
                hook_timeout,
            }),
        }
    }

    /// Append a hook to the registry
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty name or once shutdown has
    /// begun.
    #[track_caller]
    pub fn on_shutdown<F, Fut>(&self, name: impl Into<String>, hook: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let location = Location::caller();
        let hook: HookFn = Box::new(move |token| hook(token).boxed());
        self.register(name.into(), location, hook)
    }

    /// Append a [`ShutdownHook`] implementation to the registry
    #[track_caller]
    pub fn on_shutdown_hook<T>(&self, name: impl Into<String>, hook: Arc<T>) -> Result<()>
    where
        T: ShutdownHook,
    {
        let location = Location::caller();
        let hook: HookFn = Box::new(move |token| async move { hook.on_shutdown(token).await }.boxed());
        self.register(name.into(), location, hook)
    }

    fn register(
        &self,
        name: String,
        location: &'static Location<'static>,
        hook: HookFn,
    ) -> Result<()> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let rejection = if name.trim().is_empty() {
            Some(format!("shutdown hook registered at {location} has an empty name"))
        } else if registry.run.is_some() {
            Some(format!(
                "cannot register shutdown hook `{name}` after shutdown has started"
            ))
        } else {
            None
        };

        if let Some(message) = rejection {
            drop(registry);
            tracing::warn!(hook = %name, caller = %location, "Shutdown hook rejected");
            self.sequence.events.log(LogLevel::Warn, message.as_str());
            return Err(LifecycleError::configuration(message));
        }

        tracing::debug!(hook = %name, caller = %location, "Registered shutdown hook");
        registry.hooks.push(RegisteredHook {
            name,
            location,
            hook,
        });
        Ok(())
    }

    /// Run the shutdown sequence, or wait for the run already in progress
    ///
    /// `cause` is only reported by the first trigger. Must be called from
    /// within a tokio runtime.
    pub async fn shutdown(&self, cause: Option<LifecycleError>) -> Outcome {
        let run = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            match &registry.run {
                Some(run) => run.clone(),
                None => {
                    let hooks = std::mem::take(&mut registry.hooks);
                    let run = Arc::clone(&self.sequence).start(hooks, cause);
                    registry.run = Some(run.clone());
                    run
                }
            }
        };
        run.await
    }

    /// Whether the shutdown sequence has started
    pub fn is_started(&self) -> bool {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .run
            .is_some()
    }

    /// The result of a finished shutdown sequence
    pub fn outcome(&self) -> Option<Outcome> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .run
            .as_ref()
            .and_then(|run| run.peek().cloned())
    }

    pub fn hook_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .hooks
            .len()
    }
}

impl Sequence {
    fn start(self: Arc<Self>, hooks: Vec<RegisteredHook>, cause: Option<LifecycleError>) -> ShutdownRun {
        let handle = tokio::spawn(async move { self.execute(hooks, cause).await });
        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(error = %err, "Shutdown sequence aborted");
                    let message = if err.is_panic() {
                        panic_message(err.into_panic().as_ref())
                    } else {
                        err.to_string()
                    };
                    [LifecycleError::HookPanicked {
                        name: "shutdown sequence".to_string(),
                        message,
                    }]
                    .into_iter()
                    .collect::<AggregateError>()
                    .into_result()
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn execute(&self, hooks: Vec<RegisteredHook>, cause: Option<LifecycleError>) -> Outcome {
        let started = Instant::now();
        tracing::info!(hooks = hooks.len(), "Calling shutdown hooks...");
        self.events.publish(&Event::ApplicationShutdownExecuting {
            at: Utc::now(),
            cause: cause.clone(),
        });

        let mut errors = AggregateError::new();
        for hook in hooks.into_iter().rev() {
            if let Err(err) = self.run_hook(hook).await {
                errors.push(err);
            }
        }

        let result = errors.into_result();
        self.events.publish(&Event::ApplicationShutdownExecuted {
            at: Utc::now(),
            cause,
            elapsed: started.elapsed(),
            error: result.clone().err(),
        });
        result
    }

    async fn run_hook(&self, hook: RegisteredHook) -> Result<()> {
        let RegisteredHook {
            name,
            location,
            hook,
        } = hook;
        let caller_path = location.to_string();

        self.events.publish(&Event::ShutdownExecuting {
            at: Utc::now(),
            hook: name.clone(),
            caller_path: caller_path.clone(),
        });

        let started = Instant::now();
        let token = CancellationToken::new();
        // The call itself sits inside the future so a panicking closure is caught too.
        let hook_token = token.clone();
        let run = AssertUnwindSafe(async move { hook(hook_token).await }).catch_unwind();

        let outcome = match self.hook_timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| limit),
            None => Ok(run.await),
        };

        let result = match outcome {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(LifecycleError::hook(&name, err)),
            Ok(Err(payload)) => Err(LifecycleError::HookPanicked {
                name: name.clone(),
                message: panic_message(payload.as_ref()),
            }),
            Err(timeout) => {
                token.cancel();
                Err(LifecycleError::HookTimedOut {
                    name: name.clone(),
                    timeout,
                })
            }
        };

        self.events.publish(&Event::ShutdownExecuted {
            at: Utc::now(),
            hook: name,
            caller_path,
            elapsed: started.elapsed(),
            error: result.as_ref().err().cloned(),
        });

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (EventBus, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new();
        let sink = Arc::clone(&seen);
        bus.register(Arc::new(move |event: &Event| {
            let line = match event {
                Event::ShutdownExecuting { hook, .. } => format!("executing {hook}"),
                Event::ShutdownExecuted { hook, error, .. } => {
                    format!("executed {hook} ok={}", error.is_none())
                }
                other => other.kind().to_string(),
            };
            sink.lock().unwrap().push(line);
        }));
        (bus, seen)
    }

    #[tokio::test]
    async fn test_hooks_run_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let coordinator = ShutdownCoordinator::new(EventBus::new(), None);

        for name in ["h1", "h2", "h3"] {
            let order = Arc::clone(&order);
            coordinator
                .on_shutdown(name, move |_| async move {
                    order.lock().unwrap().push(name);
                    Ok(())
                })
                .unwrap();
        }

        coordinator.shutdown(None).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["h3", "h2", "h1"]);
    }

    #[tokio::test]
    async fn test_failures_are_aggregated_in_execution_order() {
        let coordinator = ShutdownCoordinator::new(EventBus::new(), None);
        let ran = Arc::new(AtomicUsize::new(0));

        for (name, fails) in [("db", true), ("cache", false), ("queue", true)] {
            let ran = Arc::clone(&ran);
            coordinator
                .on_shutdown(name, move |_| async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    if fails {
                        anyhow::bail!("{name} close failed");
                    }
                    Ok(())
                })
                .unwrap();
        }

        let err = coordinator.shutdown(None).await.unwrap_err();

        assert_eq!(ran.load(Ordering::SeqCst), 3);
        let names: Vec<_> = err
            .iter()
            .map(|e| match e {
                LifecycleError::Hook { name, .. } => name.as_str(),
                _ => "unexpected",
            })
            .collect();
        assert_eq!(names, vec!["queue", "db"]);
    }

    #[tokio::test]
    async fn test_events_wrap_each_hook() {
        let (bus, seen) = recorder();
        let coordinator = ShutdownCoordinator::new(bus, None);
        coordinator.on_shutdown("a", |_| async { Ok(()) }).unwrap();
        coordinator
            .on_shutdown("b", |_| async { Err(anyhow::anyhow!("nope")) })
            .unwrap();

        let _ = coordinator.shutdown(Some(LifecycleError::Stopped("test".into()))).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "ApplicationShutdownExecuting",
                "executing b",
                "executed b ok=false",
                "executing a",
                "executed a ok=true",
                "ApplicationShutdownExecuted",
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_run_once() {
        let coordinator = Arc::new(ShutdownCoordinator::new(EventBus::new(), None));
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        coordinator
            .on_shutdown("slow", move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(anyhow::anyhow!("still failing"))
            })
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            handles.push(tokio::spawn(async move { coordinator.shutdown(None).await }));
        }

        let mut messages = Vec::new();
        for handle in handles {
            messages.push(handle.await.unwrap().unwrap_err().to_string());
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(messages.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_panicking_hook_is_reported_and_others_run() {
        let coordinator = ShutdownCoordinator::new(EventBus::new(), None);
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        coordinator
            .on_shutdown("first", move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        coordinator
            .on_shutdown("exploding", |_| -> BoxFuture<'static, anyhow::Result<()>> {
                panic!("hook exploded")
            })
            .unwrap();

        let err = coordinator.shutdown(None).await.unwrap_err();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(matches!(
            &err.errors()[0],
            LifecycleError::HookPanicked { name, message } if name == "exploding" && message == "hook exploded"
        ));
    }

    #[tokio::test]
    async fn test_registration_rejected_after_shutdown() {
        let coordinator = ShutdownCoordinator::new(EventBus::new(), None);
        coordinator.shutdown(None).await.unwrap();

        assert!(coordinator.is_started());
        let err = coordinator
            .on_shutdown("late", |_| async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trigger_keeps_running_hooks() {
        let coordinator = ShutdownCoordinator::new(EventBus::new(), None);
        let ran = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&ran);
        coordinator
            .on_shutdown("h1", move |_| async move {
                first.lock().unwrap().push("h1");
                Ok(())
            })
            .unwrap();
        let second = Arc::clone(&ran);
        coordinator
            .on_shutdown("h2-slow", move |_| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                second.lock().unwrap().push("h2-slow");
                Ok(())
            })
            .unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), coordinator.shutdown(None)).await;
        assert!(abandoned.is_err());
        assert!(coordinator.is_started());
        assert!(coordinator.outcome().is_none());

        coordinator.shutdown(None).await.unwrap();

        assert_eq!(*ran.lock().unwrap(), vec!["h2-slow", "h1"]);
        assert!(matches!(coordinator.outcome(), Some(Ok(()))));
    }

    #[tokio::test]
    async fn test_empty_hook_name_is_rejected() {
        let (bus, seen) = recorder();
        let coordinator = ShutdownCoordinator::new(bus, None);

        let err = coordinator
            .on_shutdown("  ", |_| async { Ok(()) })
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Configuration(_)));
        assert_eq!(coordinator.hook_count(), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["Log"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hook_timeout() {
        let coordinator = ShutdownCoordinator::new(EventBus::new(), Some(Duration::from_secs(1)));
        let after = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&after);
        coordinator
            .on_shutdown("after", move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        coordinator
            .on_shutdown("stuck", |token| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                drop(token);
                Ok(())
            })
            .unwrap();

        let err = coordinator.shutdown(None).await.unwrap_err();

        assert_eq!(after.load(Ordering::SeqCst), 1);
        assert!(matches!(
            &err.errors()[0],
            LifecycleError::HookTimedOut { name, .. } if name == "stuck"
        ));
    }

    #[tokio::test]
    async fn test_trait_hook() {
        struct Pool {
            closed: AtomicUsize,
        }

        #[async_trait]
        impl ShutdownHook for Pool {
            async fn on_shutdown(&self, _token: CancellationToken) -> anyhow::Result<()> {
                self.closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let pool = Arc::new(Pool {
            closed: AtomicUsize::new(0),
        });
        let coordinator = ShutdownCoordinator::new(EventBus::new(), None);
        coordinator
            .on_shutdown_hook("pool", Arc::clone(&pool))
            .unwrap();

        coordinator.shutdown(None).await.unwrap();
        assert_eq!(pool.closed.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.hook_count(), 0);
    }
}
