//! Hub field access
//!
//! The hub is any caller-owned value; most applications use a plain struct
//! with typed fields and write to them from providers through
//! [`BuildContext::hub_mut`](crate::build::BuildContext::hub_mut). Hubs that
//! also want keyed access (for [`module`](crate::build::module) providers)
//! implement [`Hub`], or use the ready-made [`Registry`].

mod module;
mod registry;

pub use module::Module;
pub use registry::Registry;

use crate::error::Result;
use std::any::Any;
use std::sync::Arc;

/// A value stored in a keyed hub
pub type HubValue = Arc<dyn Any + Send + Sync>;

/// Keyed access to hub fields
pub trait Hub {
    /// Read the field named `key`
    ///
    /// # Errors
    ///
    /// [`LifecycleError::FieldNotFound`](crate::LifecycleError::FieldNotFound)
    /// for unknown keys.
    fn get(&self, key: &str) -> Result<HubValue>;

    /// Write the field named `key`
    ///
    /// # Errors
    ///
    /// Implementations with a fixed set of fields reject unknown keys or
    /// values of the wrong type.
    fn set(&mut self, key: &str, value: HubValue) -> Result<()>;
}
