//! Providers: the setup steps of the build pipeline

use super::BuildContext;
use crate::hub::{Hub, Module};
use async_trait::async_trait;
use std::fmt;
use std::panic::Location;

type ProviderFn<H> = Box<dyn FnOnce(&mut BuildContext<'_, H>) -> anyhow::Result<()> + Send>;

/// A provider that carries its own error policy
///
/// Unlike a plain function provider, a failing `Creator` only aborts the
/// pipeline when [`Creator::block_on_error`] returns `true`.
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_bootstrap::build::{BuildContext, Creator};
/// use async_trait::async_trait;
///
/// struct MetricsExporter;
///
/// #[async_trait]
/// impl Creator<AppHub> for MetricsExporter {
///     async fn create(&self, cx: &mut BuildContext<'_, AppHub>) -> anyhow::Result<()> {
///         cx.hub_mut().metrics = Some(connect_exporter().await?);
///         Ok(())
///     }
///
///     // The application runs fine without metrics.
///     fn block_on_error(&self) -> bool {
///         false
///     }
/// }
/// ```
#[async_trait]
pub trait Creator<H>: Send + Sync {
    async fn create(&self, cx: &mut BuildContext<'_, H>) -> anyhow::Result<()>;

    fn block_on_error(&self) -> bool {
        true
    }
}

pub(crate) enum ProviderKind<H> {
    Func(ProviderFn<H>),
    Creator(Box<dyn Creator<H>>),
}

/// A named setup step
///
/// Providers come in two shapes: a plain fallible function
/// ([`Provider::func`]) whose errors always abort the build, and a
/// [`Creator`] ([`Provider::creator`]) that decides for itself. The name and
/// the registration site are used for events only.
pub struct Provider<H> {
    name: String,
    location: &'static Location<'static>,
    kind: ProviderKind<H>,
    ignore_errors: bool,
}

impl<H: Send + 'static> Provider<H> {
    /// A provider backed by a synchronous function
    #[track_caller]
    pub fn func<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnOnce(&mut BuildContext<'_, H>) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            location: Location::caller(),
            kind: ProviderKind::Func(Box::new(func)),
            ignore_errors: false,
        }
    }

    /// A provider backed by a [`Creator`]
    #[track_caller]
    pub fn creator<C>(name: impl Into<String>, creator: C) -> Self
    where
        C: Creator<H> + 'static,
    {
        Self {
            name: name.into(),
            location: Location::caller(),
            kind: ProviderKind::Creator(Box::new(creator)),
            ignore_errors: false,
        }
    }

    /// Report failures as events instead of aborting the build
    pub fn ignore_error(mut self) -> Self {
        self.ignore_errors = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the provider was constructed, as `file:line:column`
    pub fn caller_path(&self) -> String {
        self.location.to_string()
    }

    /// Whether a failure of this provider aborts the build
    pub fn blocks_on_error(&self) -> bool {
        if self.ignore_errors {
            return false;
        }
        match &self.kind {
            ProviderKind::Func(_) => true,
            ProviderKind::Creator(creator) => creator.block_on_error(),
        }
    }

    pub(crate) fn into_kind(self) -> ProviderKind<H> {
        self.kind
    }
}

impl<H> fmt::Debug for Provider<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self.kind {
            ProviderKind::Func(_) => "func",
            ProviderKind::Creator(_) => "creator",
        };
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("shape", &shape)
            .field("ignore_errors", &self.ignore_errors)
            .finish()
    }
}

/// Wrap `provider` so its failures never abort the build
pub fn ignore_error<H: Send + 'static>(provider: Provider<H>) -> Provider<H> {
    provider.ignore_error()
}

/// A provider that stores a [`Module`] into the hub under the module's name
///
/// The factory runs with the build context; its error becomes the provider's
/// error, and so does a failed [`Hub::set`].
#[track_caller]
pub fn module<H, F>(name: impl Into<String>, factory: F) -> Provider<H>
where
    H: Hub + Send + 'static,
    F: FnOnce(&mut BuildContext<'_, H>) -> anyhow::Result<Module> + Send + 'static,
{
    Provider::func(name, move |cx| {
        let module = factory(cx)?;
        cx.hub_mut().set(&module.name, module.data)?;
        Ok(())
    })
}
