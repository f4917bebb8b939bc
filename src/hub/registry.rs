use super::{Hub, HubValue};
use crate::error::{LifecycleError, Result};
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

#[derive(Clone)]
struct Entry {
    value: HubValue,
    type_name: &'static str,
}

/// Thread-safe keyed hub
///
/// Values are stored by name and resolved back to their concrete type.
/// Cloning a registry shares nothing: the clone holds its own map with the
/// same `Arc` values.
#[derive(Clone, Default)]
pub struct Registry {
    entries: DashMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> &Self {
        self.insert_arc(key, Arc::new(value))
    }

    /// Store an already shared value under `key`
    pub fn insert_arc<T: Any + Send + Sync>(&self, key: impl Into<String>, value: Arc<T>) -> &Self {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                type_name: std::any::type_name::<T>(),
            },
        );
        self
    }

    /// Resolve the value stored under `key` as a `T`
    pub fn resolve<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| LifecycleError::FieldNotFound {
                key: key.to_string(),
            })?;

        Arc::clone(&entry.value)
            .downcast::<T>()
            .map_err(|_| LifecycleError::FieldTypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// Name of the type stored under `key`
    pub fn type_name(&self, key: &str) -> Option<&'static str> {
        self.entries.get(key).map(|entry| entry.type_name)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<HubValue> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Hub for Registry {
    fn get(&self, key: &str) -> Result<HubValue> {
        self.entries
            .get(key)
            .map(|entry| Arc::clone(&entry.value))
            .ok_or_else(|| LifecycleError::FieldNotFound {
                key: key.to_string(),
            })
    }

    fn set(&mut self, key: &str, value: HubValue) -> Result<()> {
        if key.is_empty() {
            return Err(LifecycleError::configuration("hub field name cannot be empty"));
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                type_name: "dyn Any",
            },
        );
        Ok(())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for entry in self.entries.iter() {
            map.entry(entry.key(), &entry.value().type_name);
        }
        map.finish()
    }
}
