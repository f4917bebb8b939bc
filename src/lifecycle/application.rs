//! Application Bootstrap
//!
//! [`App`] owns the hub and drives the whole lifecycle: build the hub with
//! providers, wait while background tasks run, then shut down.

use super::Lifecycle;
use crate::build::{BuildPipeline, Provider};
use crate::config::Options;
use crate::error::{LifecycleError, Result};
use crate::event::EventHandler;
use crate::logger::LogLevel;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// An application: a hub plus its lifecycle
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_bootstrap::prelude::*;
///
/// #[derive(Default)]
/// struct AppHub {
///     db: Option<Arc<Database>>,
/// }
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut app = AppBuilder::new()
///         .app_name("billing")
///         .graceful_shutdown(true)
///         .event_handler(Arc::new(TracingEventHandler))
///         .build(AppHub::default());
///
///     app.builds([
///         Provider::func("database", |cx| {
///             let db = Arc::new(Database::connect_lazy()?);
///             cx.hub_mut().db = Some(Arc::clone(&db));
///             cx.on_shutdown("database", move |_| async move { db.close().await })?;
///             Ok(())
///         }),
///         Provider::func("http", |cx| {
///             cx.run_task("http", |token| serve_until(token));
///             Ok(())
///         }),
///     ])
///     .await?;
///
///     match app.wait().await {
///         Err(err) if err.is_graceful() => Ok(()),
///         other => Ok(other?),
///     }
/// }
/// ```
pub struct App<H> {
    hub: H,
    lifecycle: Lifecycle,
    options: Options,
}

impl<H: Send + 'static> App<H> {
    /// Create an application with default options
    pub fn new(hub: H) -> Self {
        Self::with_options(hub, Options::default())
    }

    /// Create an application from prepared options
    ///
    /// Outside a tokio runtime, a requested signal listener is installed by
    /// the first `builds` or `wait`.
    pub fn with_options(hub: H, options: Options) -> Self {
        let lifecycle = Lifecycle::new(&options);
        Self {
            hub,
            lifecycle,
            options,
        }
    }

    pub fn hub(&self) -> &H {
        &self.hub
    }

    pub fn hub_mut(&mut self) -> &mut H {
        &mut self.hub
    }

    pub fn into_hub(self) -> H {
        self.hub
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn app_name(&self) -> &str {
        &self.options.app_name
    }

    /// Attach an observer after construction
    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        self.lifecycle.register_handler(handler);
    }

    /// Install the interrupt listener; `Ok(false)` if already installed
    ///
    /// # Errors
    ///
    /// Returns a configuration error when called outside a tokio runtime.
    pub fn enable_graceful_shutdown(&self) -> Result<bool> {
        self.lifecycle.enable_graceful_shutdown()
    }

    /// Run one provider
    ///
    /// See [`BuildPipeline::build`].
    pub async fn build(&mut self, provider: Provider<H>) -> Result<()> {
        BuildPipeline::new(&mut self.hub, &self.lifecycle)
            .build(provider)
            .await
    }

    /// Run providers in order; a blocking failure shuts the application down
    ///
    /// See [`BuildPipeline::builds`].
    pub async fn builds<I>(&mut self, providers: I) -> Result<()>
    where
        I: IntoIterator<Item = Provider<H>>,
    {
        BuildPipeline::new(&mut self.hub, &self.lifecycle)
            .builds(providers)
            .await
    }

    /// Block until cancelled or every task has finished, then shut down
    ///
    /// See [`Lifecycle::wait`].
    pub async fn wait(&self) -> Result<()> {
        self.lifecycle.wait().await
    }

    /// Request a stop with `reason`
    pub fn stop(&self, reason: impl Into<String>) -> bool {
        self.lifecycle.stop(reason)
    }

    /// Stop and run the shutdown hooks; idempotent
    pub async fn shutdown(&self) -> Result<()> {
        self.lifecycle.shutdown().await
    }

    /// The first cancellation cause, if any
    pub fn cause(&self) -> Option<LifecycleError> {
        self.lifecycle.cause()
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.lifecycle.log(level, message);
    }
}

/// Builder for [`App`]
#[derive(Debug, Default)]
pub struct AppBuilder {
    options: Options,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every option at once
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.options.app_name = name.into();
        self
    }

    /// Cancel the application on Ctrl+C / SIGTERM
    pub fn graceful_shutdown(mut self, enabled: bool) -> Self {
        self.options.graceful_shutdown = enabled;
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.options.event_handlers.push(handler);
        self
    }

    pub fn with_event_handlers<I>(mut self, handlers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn EventHandler>>,
    {
        self.options.event_handlers.extend(handlers);
        self
    }

    /// Base cancellation context
    pub fn parent(mut self, token: CancellationToken) -> Self {
        self.options.parent = Some(token);
        self
    }

    /// Bound each shutdown hook
    pub fn hook_timeout(mut self, timeout: Duration) -> Self {
        self.options.hook_timeout = Some(timeout);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.options.log_level = level;
        self
    }

    /// Build the application around `hub`
    pub fn build<H: Send + 'static>(self, hub: H) -> App<H> {
        App::with_options(hub, self.options)
    }
}
