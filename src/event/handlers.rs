//! Built-in event handlers

use super::{Event, EventHandler};
use crate::logger::{LogLevel, Logger};

/// Renders every lifecycle event as a `tracing` line
///
/// Successful steps log at `debug`, the build/shutdown summaries at `info`
/// and failures at `error`.
#[derive(Debug, Clone, Default)]
pub struct TracingEventHandler;

impl EventHandler for TracingEventHandler {
    fn on_event(&self, event: &Event) {
        match event {
            Event::BuildsExecuting { providers, .. } => {
                tracing::info!(providers, "Running providers...");
            }
            Event::BuildsExecuted { elapsed, error, .. } => match error {
                None => tracing::info!(?elapsed, "Providers complete"),
                Some(err) => tracing::error!(?elapsed, error = %err, "Providers aborted"),
            },
            Event::BuildExecuting {
                provider,
                caller_path,
                ..
            } => {
                tracing::debug!(provider = %provider, caller = %caller_path, "Building");
            }
            Event::BuildExecuted {
                provider,
                elapsed,
                error,
                ..
            } => match error {
                None => tracing::debug!(provider = %provider, ?elapsed, "Built ✓"),
                Some(err) => {
                    tracing::error!(provider = %provider, ?elapsed, error = %err, "Build failed ✕")
                }
            },
            Event::ShutdownExecuting {
                hook, caller_path, ..
            } => {
                tracing::debug!(hook = %hook, caller = %caller_path, "Running shutdown hook");
            }
            Event::ShutdownExecuted {
                hook,
                elapsed,
                error,
                ..
            } => match error {
                None => tracing::debug!(hook = %hook, ?elapsed, "Shutdown hook ✓"),
                Some(err) => {
                    tracing::error!(hook = %hook, ?elapsed, error = %err, "Shutdown hook failed ✕")
                }
            },
            Event::ApplicationShutdownExecuting { cause, .. } => match cause {
                Some(cause) => tracing::info!(cause = %cause, "Shutting down application..."),
                None => tracing::info!("Shutting down application..."),
            },
            Event::ApplicationShutdownExecuted { elapsed, error, .. } => match error {
                None => tracing::info!(?elapsed, "Application shutdown complete"),
                Some(err) => tracing::error!(
                    ?elapsed,
                    failures = err.len(),
                    error = %err,
                    "Application shutdown completed with errors"
                ),
            },
            Event::Log { level, message, .. } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}

/// Forwards [`Event::Log`] events to a [`Logger`]
///
/// All other variants are ignored.
#[derive(Debug, Clone)]
pub struct LogForwarder<L> {
    logger: L,
}

impl<L: Logger> LogForwarder<L> {
    pub fn new(logger: L) -> Self {
        Self { logger }
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }
}

impl<L: Logger> EventHandler for LogForwarder<L> {
    fn on_event(&self, event: &Event) {
        if let Event::Log { level, message, .. } = event {
            self.logger.log(*level, message);
        }
    }
}
