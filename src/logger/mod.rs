//! Logger capability
//!
//! The lifecycle core never writes log output directly to a sink chosen by the
//! caller. It publishes [`Event::Log`](crate::event::Event::Log) events, and a
//! [`LogForwarder`](crate::event::LogForwarder) can route those to any
//! [`Logger`]. [`TracingLogger`] is the default backend.

use strum_macros::{Display, EnumString};

/// Severity of a log event
///
/// Levels are ordered: `Debug < Info < Warn < Error`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Something that can receive log lines from the lifecycle core
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);

    /// Dispatch on a runtime level
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => self.debug(message),
            LogLevel::Info => self.info(message),
            LogLevel::Warn => self.warn(message),
            LogLevel::Error => self.error(message),
        }
    }
}

/// [`Logger`] backed by `tracing`
///
/// Every line carries the application name as the `app` field.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    app: String,
}

impl TracingLogger {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into() }
    }
}

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(app = %self.app, "{}", message);
    }

    fn info(&self, message: &str) {
        tracing::info!(app = %self.app, "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(app = %self.app, "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(app = %self.app, "{}", message);
    }
}
