use super::HubValue;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A named value produced by a module factory
///
/// See [`build::module`](crate::build::module).
#[derive(Clone)]
pub struct Module {
    pub name: String,
    pub data: HubValue,
}

impl Module {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, data: T) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(data),
        }
    }

    /// Wrap a value that is already shared elsewhere
    pub fn from_arc<T: Any + Send + Sync>(name: impl Into<String>, data: Arc<T>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module").field("name", &self.name).finish_non_exhaustive()
    }
}
