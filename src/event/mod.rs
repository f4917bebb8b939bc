//! Lifecycle events and the synchronous event bus
//!
//! Every build step, shutdown hook and log line is published as an [`Event`].
//! Delivery is synchronous: [`EventBus::publish`] calls each handler in
//! registration order on the publishing task and returns once all of them
//! have seen the event.

mod handlers;

pub use handlers::{LogForwarder, TracingEventHandler};

use crate::error::{AggregateError, LifecycleError};
use crate::logger::LogLevel;
use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Everything the lifecycle core reports to observers
///
/// The set of variants is closed; observers extend behaviour by registering
/// handlers, never by adding event kinds.
#[derive(Debug, Clone)]
pub enum Event {
    /// A build pass is about to run its providers
    BuildsExecuting {
        at: DateTime<Utc>,
        providers: usize,
    },
    /// A build pass has finished
    BuildsExecuted {
        at: DateTime<Utc>,
        elapsed: Duration,
        error: Option<LifecycleError>,
    },
    /// A single provider is about to run
    BuildExecuting {
        at: DateTime<Utc>,
        provider: String,
        caller_path: String,
    },
    /// A single provider has returned
    ///
    /// `error` is also set for non-blocking providers whose failure was ignored.
    BuildExecuted {
        at: DateTime<Utc>,
        provider: String,
        caller_path: String,
        elapsed: Duration,
        error: Option<LifecycleError>,
    },
    /// A shutdown hook is about to run
    ShutdownExecuting {
        at: DateTime<Utc>,
        hook: String,
        caller_path: String,
    },
    /// A shutdown hook has returned
    ShutdownExecuted {
        at: DateTime<Utc>,
        hook: String,
        caller_path: String,
        elapsed: Duration,
        error: Option<LifecycleError>,
    },
    /// The shutdown sequence is starting
    ApplicationShutdownExecuting {
        at: DateTime<Utc>,
        cause: Option<LifecycleError>,
    },
    /// The shutdown sequence has finished
    ApplicationShutdownExecuted {
        at: DateTime<Utc>,
        cause: Option<LifecycleError>,
        elapsed: Duration,
        error: Option<AggregateError>,
    },
    /// A log line emitted by the core or by application code
    Log {
        at: DateTime<Utc>,
        level: LogLevel,
        message: String,
    },
}

impl Event {
    /// Stable name of the variant, useful as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            Event::BuildsExecuting { .. } => "BuildsExecuting",
            Event::BuildsExecuted { .. } => "BuildsExecuted",
            Event::BuildExecuting { .. } => "BuildExecuting",
            Event::BuildExecuted { .. } => "BuildExecuted",
            Event::ShutdownExecuting { .. } => "ShutdownExecuting",
            Event::ShutdownExecuted { .. } => "ShutdownExecuted",
            Event::ApplicationShutdownExecuting { .. } => "ApplicationShutdownExecuting",
            Event::ApplicationShutdownExecuted { .. } => "ApplicationShutdownExecuted",
            Event::Log { .. } => "Log",
        }
    }

    /// When the event was created
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::BuildsExecuting { at, .. }
            | Event::BuildsExecuted { at, .. }
            | Event::BuildExecuting { at, .. }
            | Event::BuildExecuted { at, .. }
            | Event::ShutdownExecuting { at, .. }
            | Event::ShutdownExecuted { at, .. }
            | Event::ApplicationShutdownExecuting { at, .. }
            | Event::ApplicationShutdownExecuted { at, .. }
            | Event::Log { at, .. } => *at,
        }
    }

    /// Time spent, for the `*Executed` variants
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Event::BuildsExecuted { elapsed, .. }
            | Event::BuildExecuted { elapsed, .. }
            | Event::ShutdownExecuted { elapsed, .. }
            | Event::ApplicationShutdownExecuted { elapsed, .. } => Some(*elapsed),
            _ => None,
        }
    }

    /// Whether the event reports a failure
    pub fn is_failure(&self) -> bool {
        match self {
            Event::BuildsExecuted { error, .. }
            | Event::BuildExecuted { error, .. }
            | Event::ShutdownExecuted { error, .. } => error.is_some(),
            Event::ApplicationShutdownExecuted { error, .. } => error.is_some(),
            _ => false,
        }
    }
}

/// Observer of lifecycle events
///
/// Handlers run on the publishing task; a slow handler delays the lifecycle.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// Synchronous in-process event bus
///
/// Cloning the bus shares the handler list. [`EventBus::log`] drops log
/// events below the bus's minimum level; [`EventBus::publish`] never filters.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
    min_log_level: LogLevel,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus with an initial set of handlers
    pub fn with_handlers(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(handlers)),
            min_log_level: LogLevel::default(),
        }
    }

    /// Set the minimum level for [`EventBus::log`]
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.min_log_level = level;
        self
    }

    pub fn log_level(&self) -> LogLevel {
        self.min_log_level
    }

    /// Publish an [`Event::Log`] if `level` passes the minimum
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if level < self.min_log_level {
            return;
        }
        self.publish(&Event::Log {
            at: Utc::now(),
            level,
            message: message.into(),
        });
    }

    /// Append a handler; it sees every event published afterwards
    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    /// Deliver an event to every handler, in registration order
    pub fn publish(&self, event: &Event) {
        // Snapshot so a handler may register further handlers without deadlocking.
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for handler in &handlers {
            handler.on_event(event);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
