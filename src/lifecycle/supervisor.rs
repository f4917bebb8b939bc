//! Background task supervision
//!
//! Tasks run on the tokio runtime and are tracked until they finish. The first
//! task to fail cancels the whole application with its error as the cause;
//! the remaining tasks are expected to watch their token and return.

use super::Cancellation;
use crate::error::{LifecycleError, Result, panic_message};
use crate::event::EventBus;
use crate::logger::LogLevel;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Tracks background tasks with a stop-on-first-error policy
///
/// Failures are also published as error-level log events.
#[derive(Clone)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    cancellation: Cancellation,
    first_error: Arc<OnceLock<LifecycleError>>,
    events: EventBus,
}

impl TaskSupervisor {
    pub fn new(cancellation: Cancellation, events: EventBus) -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancellation,
            first_error: Arc::new(OnceLock::new()),
            events,
        }
    }

    /// Spawn `task` in the background
    ///
    /// The closure receives the application's cancellation token. An `Err`
    /// or a panic cancels the application with that failure as the cause.
    /// Never blocks; must be called from within a tokio runtime.
    pub fn run_task<F, Fut>(&self, name: impl Into<String>, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let future = task(self.cancellation.token());
        let cancellation = self.cancellation.clone();
        let first_error = Arc::clone(&self.first_error);
        let events = self.events.clone();

        tracing::debug!(task = %name, "Spawning background task");

        self.tracker.spawn(async move {
            let failure = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => {
                    tracing::debug!(task = %name, "Background task finished");
                    return;
                }
                Ok(Err(err)) => LifecycleError::task(&name, err),
                Err(payload) => LifecycleError::TaskPanicked {
                    name: name.clone(),
                    message: panic_message(payload.as_ref()),
                },
            };

            tracing::error!(task = %name, error = %failure, "Background task failed");
            events.log(LogLevel::Error, failure.to_string());
            let _ = first_error.set(failure.clone());
            cancellation.cancel(failure);
        });
    }

    /// Resolve when the application is cancelled or every task has finished
    ///
    /// Cancellation yields its cause. Completion yields the first task error,
    /// if any task failed.
    pub async fn wait(&self) -> Result<()> {
        self.tracker.close();

        tokio::select! {
            biased;
            cause = self.cancellation.cancelled() => Err(cause),
            () = self.tracker.wait() => match self.first_error.get() {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            },
        }
    }

    /// Number of tasks still running
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }
}
