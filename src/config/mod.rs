use crate::event::EventHandler;
use crate::logger::LogLevel;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Application options
///
/// Usually assembled through [`AppBuilder`](crate::lifecycle::AppBuilder);
/// a prepared value can be passed with `AppBuilder::options`.
#[derive(Clone, Default)]
pub struct Options {
    /// Display name, used in log fields only
    pub app_name: String,
    /// Install the interrupt listener when the application is built
    pub graceful_shutdown: bool,
    /// Observers attached before the first event is published
    pub event_handlers: Vec<Arc<dyn EventHandler>>,
    /// Base cancellation context; cancelling it cancels the application
    pub parent: Option<CancellationToken>,
    /// Upper bound for each shutdown hook; `None` waits indefinitely
    pub hook_timeout: Option<Duration>,
    /// Minimum level for published log events
    pub log_level: LogLevel,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("app_name", &self.app_name)
            .field("graceful_shutdown", &self.graceful_shutdown)
            .field("event_handlers", &self.event_handlers.len())
            .field("parent", &self.parent.is_some())
            .field("hook_timeout", &self.hook_timeout)
            .field("log_level", &self.log_level)
            .finish()
    }
}
