use super::provider::ProviderKind;
use super::{BuildContext, Provider};
use crate::error::{LifecycleError, Result};
use crate::event::Event;
use crate::lifecycle::Lifecycle;
use crate::logger::LogLevel;
use chrono::Utc;
use std::time::Instant;

/// Runs providers against a hub, in order
pub struct BuildPipeline<'a, H> {
    hub: &'a mut H,
    lifecycle: &'a Lifecycle,
}

impl<'a, H: Send + 'static> BuildPipeline<'a, H> {
    pub fn new(hub: &'a mut H, lifecycle: &'a Lifecycle) -> Self {
        Self { hub, lifecycle }
    }

    /// Run a single provider
    ///
    /// A failing blocking provider returns its error. A failing non-blocking
    /// provider is reported through events and a log event, and this returns
    /// `Ok`. A provider with an empty name is not run and always fails with
    /// a configuration error. Never triggers shutdown by itself; see [`BuildPipeline::builds`].
    pub async fn build(&mut self, provider: Provider<H>) -> Result<()> {
        let name = provider.name().to_string();
        let caller_path = provider.caller_path();
        let blocking = provider.blocks_on_error();
        let events = self.lifecycle.events();

        events.publish(&Event::BuildExecuting {
            at: Utc::now(),
            provider: name.clone(),
            caller_path: caller_path.clone(),
        });

        let started = Instant::now();
        let error = if name.trim().is_empty() {
            Some(LifecycleError::configuration(format!(
                "provider registered at {caller_path} has an empty name"
            )))
        } else {
            let mut cx = BuildContext::new(&mut *self.hub, self.lifecycle);
            let outcome = match provider.into_kind() {
                ProviderKind::Func(func) => func(&mut cx),
                ProviderKind::Creator(creator) => creator.create(&mut cx).await,
            };
            outcome.err().map(|err| LifecycleError::provider(&name, err))
        };
        let elapsed = started.elapsed();
        let blocking = blocking || matches!(error, Some(LifecycleError::Configuration(_)));

        events.publish(&Event::BuildExecuted {
            at: Utc::now(),
            provider: name.clone(),
            caller_path,
            elapsed,
            error: error.clone(),
        });

        match error {
            None => {
                tracing::debug!(provider = %name, ?elapsed, "Provider complete");
                Ok(())
            }
            Some(err) if blocking => Err(err),
            Some(err) => {
                tracing::warn!(provider = %name, error = %err, "Provider error ignored");
                self.lifecycle
                    .log(LogLevel::Error, format!("provider error ignored: {err}"));
                Ok(())
            }
        }
    }

    /// Run every provider in order, stopping at the first blocking failure
    ///
    /// On a blocking failure the remaining providers are skipped, the
    /// application is cancelled with the provider's error as the cause and
    /// the shutdown hooks registered so far are run before the error is
    /// returned.
    pub async fn builds<I>(&mut self, providers: I) -> Result<()>
    where
        I: IntoIterator<Item = Provider<H>>,
    {
        self.lifecycle.arm_signal_listener();
        let providers: Vec<_> = providers.into_iter().collect();
        let started = Instant::now();

        tracing::info!(
            app = %self.lifecycle.app_name(),
            providers = providers.len(),
            "Starting application build..."
        );
        self.lifecycle.events().publish(&Event::BuildsExecuting {
            at: Utc::now(),
            providers: providers.len(),
        });

        let mut result = Ok(());
        for provider in providers {
            if let Err(err) = self.build(provider).await {
                result = Err(err);
                break;
            }
        }

        self.lifecycle.events().publish(&Event::BuildsExecuted {
            at: Utc::now(),
            elapsed: started.elapsed(),
            error: result.as_ref().err().cloned(),
        });

        match &result {
            Ok(()) => {
                tracing::info!(elapsed = ?started.elapsed(), "Application build complete");
            }
            Err(err) => {
                tracing::error!(error = %err, "Application build failed");
                self.lifecycle.cancel(err.clone());
                if let Err(shutdown_err) = self.lifecycle.run_shutdown().await {
                    tracing::error!(error = %shutdown_err, "Shutdown after build failure reported errors");
                }
            }
        }

        result
    }
}
