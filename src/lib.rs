//! # Meshestra Bootstrap
//!
//! Application bootstrap and lifecycle core for Rust services.
//!
//! An [`App`] owns a caller-defined hub of dependencies. Providers populate
//! the hub one after another, in the order they are given; along the way
//! they register shutdown hooks and spawn supervised background tasks. The
//! application then runs until every task finishes, a task fails, a signal
//! arrives or someone calls [`App::stop`]. Shutdown hooks run exactly once,
//! in reverse registration order, and their failures are aggregated.
//!
//! ## Features
//!
//! - **Ordered providers**: plain functions abort the build on error;
//!   [`Creator`](build::Creator)s decide with `block_on_error`
//! - **Supervised tasks**: stop-on-first-error with a shared cancellation cause
//! - **Reverse-order shutdown**: run-once, concurrent-safe, errors aggregated
//! - **Events**: every step is published synchronously to registered handlers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshestra_bootstrap::prelude::*;
//!
//! #[derive(Default)]
//! struct AppHub {
//!     greeting: Option<String>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut app = AppBuilder::new()
//!         .app_name("hello")
//!         .graceful_shutdown(true)
//!         .event_handler(Arc::new(TracingEventHandler))
//!         .build(AppHub::default());
//!
//!     app.builds([
//!         Provider::func("greeting", |cx: &mut BuildContext<'_, AppHub>| {
//!             cx.hub_mut().greeting = Some("hello".into());
//!             cx.on_shutdown("greeting", |_| async { Ok(()) })?;
//!             Ok(())
//!         }),
//!         Provider::func("server", |cx: &mut BuildContext<'_, AppHub>| {
//!             cx.run_task("server", |token| async move {
//!                 token.cancelled().await;
//!                 Ok(())
//!             });
//!             Ok(())
//!         }),
//!     ])
//!     .await?;
//!
//!     match app.wait().await {
//!         Err(err) if err.is_graceful() => Ok(()),
//!         other => Ok(other?),
//!     }
//! }
//! ```

pub mod build;
pub mod config;
pub mod error;
pub mod event;
pub mod hub;
pub mod lifecycle;
pub mod logger;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export core types
pub use build::{BuildContext, Creator, Provider};
pub use config::Options;
pub use error::{AggregateError, LifecycleError, Result};
pub use event::{Event, EventBus, EventHandler};
pub use hub::{Hub, Module, Registry};
pub use lifecycle::{App, AppBuilder, Lifecycle};
pub use logger::{LogLevel, Logger};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports
///
/// ```
/// use meshestra_bootstrap::prelude::*;
/// ```
pub mod prelude {
    pub use crate::build::{BuildContext, Creator, Provider, ignore_error, module};
    pub use crate::config::Options;
    pub use crate::error::{AggregateError, LifecycleError, Result};
    pub use crate::event::{Event, EventBus, EventHandler, LogForwarder, TracingEventHandler};
    pub use crate::hub::{Hub, HubValue, Module, Registry};
    pub use crate::lifecycle::{
        App, AppBuilder, Cancellation, Lifecycle, ShutdownHook, shutdown_signal,
    };
    pub use crate::logger::{LogLevel, Logger, TracingLogger};
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
    pub use tokio_util::sync::CancellationToken;
}
