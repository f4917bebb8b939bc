//! Build pipeline
//!
//! Providers run strictly in registration order, one at a time, against the
//! application's hub. Each step is wrapped in `BuildExecuting` /
//! `BuildExecuted` events and the whole pass in `BuildsExecuting` /
//! `BuildsExecuted`.
//!
//! ```text
//! builds([p0, p1, p2])
//!   BuildsExecuting
//!   BuildExecuting(p0) → p0 → BuildExecuted(p0)
//!   BuildExecuting(p1) → p1 ✕ (blocking) → BuildExecuted(p1, error)
//!   BuildsExecuted(error)
//!   shutdown (cause: provider failure in `p1`)
//! ```

mod pipeline;
mod provider;

pub use pipeline::BuildPipeline;
pub use provider::{Creator, Provider, ignore_error, module};

use crate::lifecycle::Lifecycle;
use crate::logger::LogLevel;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// What a provider sees while it runs: the hub and the lifecycle
pub struct BuildContext<'a, H> {
    hub: &'a mut H,
    lifecycle: &'a Lifecycle,
}

impl<'a, H> BuildContext<'a, H> {
    pub fn new(hub: &'a mut H, lifecycle: &'a Lifecycle) -> Self {
        Self { hub, lifecycle }
    }

    pub fn hub(&self) -> &H {
        self.hub
    }

    pub fn hub_mut(&mut self) -> &mut H {
        self.hub
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        self.lifecycle
    }

    /// Register a teardown step for what this provider set up
    #[track_caller]
    pub fn on_shutdown<F, Fut>(&self, name: impl Into<String>, hook: F) -> crate::Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.lifecycle.on_shutdown(name, hook)
    }

    /// Start a supervised background task and return immediately
    pub fn run_task<F, Fut>(&self, name: impl Into<String>, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.lifecycle.run_task(name, task);
    }

    /// The application's cancellation token
    pub fn token(&self) -> CancellationToken {
        self.lifecycle.token()
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.lifecycle.log(level, message);
    }
}
