//! Error types shared by every lifecycle component

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A caller-supplied failure, shareable between every observer of a result.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A specialized Result type for bootstrap and lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors that can occur while building, supervising or shutting down an application
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// A provider failed during the build pipeline
    #[error("provider failure in `{name}`: {source}")]
    Provider {
        /// Identity of the provider
        name: String,
        /// Error returned by the provider
        source: SharedError,
    },

    /// A background task returned an error
    #[error("task `{name}` failed: {source}")]
    Task {
        /// Identity of the task
        name: String,
        /// Error returned by the task
        source: SharedError,
    },

    /// A background task panicked
    #[error("task `{name}` panicked: {message}")]
    TaskPanicked {
        /// Identity of the task
        name: String,
        /// Panic payload, when it was a string
        message: String,
    },

    /// A shutdown hook returned an error
    #[error("shutdown hook `{name}` failed: {source}")]
    Hook {
        /// Identity of the hook
        name: String,
        /// Error returned by the hook
        source: SharedError,
    },

    /// A shutdown hook panicked
    #[error("shutdown hook `{name}` panicked: {message}")]
    HookPanicked {
        /// Identity of the hook
        name: String,
        /// Panic payload, when it was a string
        message: String,
    },

    /// A shutdown hook exceeded the configured hook timeout
    #[error("shutdown hook `{name}` timed out after {timeout:?}")]
    HookTimedOut {
        /// Identity of the hook
        name: String,
        /// The configured limit
        timeout: Duration,
    },

    /// Invalid configuration or registration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A hub field was not found
    #[error("hub field not found: {key}")]
    FieldNotFound {
        /// The requested key
        key: String,
    },

    /// A hub field holds a value of another type
    #[error("hub field `{key}` is not a `{expected}`")]
    FieldTypeMismatch {
        /// The requested key
        key: String,
        /// The type the caller asked for
        expected: String,
    },

    /// An interrupt signal was received
    #[error("received signal: {0}")]
    Signal(String),

    /// The application was stopped explicitly
    #[error("application stopped: {0}")]
    Stopped(String),

    /// The parent cancellation token was cancelled without a cause
    #[error("context canceled")]
    Cancelled,

    /// One or more shutdown hooks failed
    #[error("shutdown failed: {0}")]
    Shutdown(AggregateError),
}

impl LifecycleError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a provider failure from the provider's own error
    pub fn provider(name: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Provider {
            name: name.into(),
            source: share(source),
        }
    }

    /// Create a task failure from the task's own error
    pub fn task(name: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Task {
            name: name.into(),
            source: share(source),
        }
    }

    /// Create a hook failure from the hook's own error
    pub fn hook(name: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Hook {
            name: name.into(),
            source: share(source),
        }
    }

    /// Whether this error describes a requested stop rather than a failure
    ///
    /// Signals, explicit stops and a cancelled parent context end the
    /// application normally; callers usually exit with success on these.
    pub fn is_graceful(&self) -> bool {
        matches!(self, Self::Signal(_) | Self::Stopped(_) | Self::Cancelled)
    }
}

/// Order-preserving collection of independent errors
///
/// An empty collection is equivalent to success; see [`AggregateError::into_result`].
#[derive(Debug, Clone, Default)]
pub struct AggregateError {
    errors: Vec<LifecycleError>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: LifecycleError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// The collected errors, in the order they occurred
    pub fn errors(&self) -> &[LifecycleError] {
        &self.errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &LifecycleError> {
        self.errors.iter()
    }

    /// `Ok(())` when nothing was collected
    pub fn into_result(self) -> std::result::Result<(), AggregateError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "no errors"),
            [single] => write!(f, "{single}"),
            errors => {
                write!(f, "{} errors occurred: ", errors.len())?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{err}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for AggregateError {}

impl FromIterator<LifecycleError> for AggregateError {
    fn from_iter<I: IntoIterator<Item = LifecycleError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl From<AggregateError> for LifecycleError {
    fn from(err: AggregateError) -> Self {
        LifecycleError::Shutdown(err)
    }
}

pub(crate) fn share(err: anyhow::Error) -> SharedError {
    let boxed: Box<dyn std::error::Error + Send + Sync + 'static> = err.into();
    Arc::from(boxed)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mentions_provider_failure() {
        let err = LifecycleError::provider("database", anyhow::anyhow!("connection refused"));
        assert_eq!(
            err.to_string(),
            "provider failure in `database`: connection refused"
        );
    }

    #[test]
    fn test_empty_aggregate_is_success() {
        assert!(AggregateError::new().into_result().is_ok());
    }

    #[test]
    fn test_aggregate_preserves_order() {
        let aggregate: AggregateError = vec![
            LifecycleError::hook("cache", anyhow::anyhow!("flush failed")),
            LifecycleError::hook("db", anyhow::anyhow!("close failed")),
        ]
        .into_iter()
        .collect();

        let err = aggregate.into_result().unwrap_err();
        assert_eq!(err.len(), 2);
        assert_eq!(
            err.to_string(),
            "2 errors occurred: shutdown hook `cache` failed: flush failed; \
             shutdown hook `db` failed: close failed"
        );
    }

    #[test]
    fn test_graceful_causes() {
        assert!(LifecycleError::Signal("interrupt".into()).is_graceful());
        assert!(LifecycleError::Stopped("done".into()).is_graceful());
        assert!(!LifecycleError::task("worker", anyhow::anyhow!("boom")).is_graceful());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("exploded");
        assert_eq!(panic_message(payload.as_ref()), "exploded");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
