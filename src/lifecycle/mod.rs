//! Lifecycle Module
//!
//! Supervision and teardown of a running application.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. AppBuilder (options, event handlers, signal listener)
//!    ↓
//! 2. builds(providers)                 ← providers register hooks / spawn tasks
//!    ↓
//! [Running...]
//!    ↓
//! 3. wait() resolves on:
//!      - every task finished
//!      - a task failing                 (cause: the task's error)
//!      - Ctrl+C / SIGTERM               (cause: the signal)
//!      - stop() / shutdown()            (cause: the reason)
//!    ↓
//! 4. Shutdown hooks, last registered first
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use meshestra_bootstrap::lifecycle::Lifecycle;
//!
//! let lifecycle = Lifecycle::new(&Options::default());
//!
//! lifecycle.run_task("ticker", |token| async move {
//!     loop {
//!         tokio::select! {
//!             _ = token.cancelled() => return Ok(()),
//!             _ = tokio::time::sleep(Duration::from_secs(1)) => tracing::info!("tick"),
//!         }
//!     }
//! });
//!
//! lifecycle.on_shutdown("ticker", |_| async { Ok(()) })?;
//! lifecycle.wait().await?;
//! ```

mod application;
mod cancel;
mod manager;
mod shutdown;
mod signal;
mod supervisor;

pub use application::{App, AppBuilder};
pub use cancel::Cancellation;
pub use manager::Lifecycle;
pub use shutdown::{ShutdownCoordinator, ShutdownHook};
pub use signal::{GracefulSignalListener, shutdown_signal};
pub use supervisor::TaskSupervisor;
