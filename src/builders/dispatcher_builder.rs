//! Builders to construct dispatchers from configuration.

use std::collections::HashMap;

use crate::config::DispatcherConfig;
use crate::core::{DispatchError, Dispatcher, SharedAuditSink, TaskTransport};
use crate::infra::HttpTransport;

/// Step-by-step construction of a [`Dispatcher`].
pub struct DispatcherBuilder {
    name: String,
    config: DispatcherConfig,
    audit: Option<SharedAuditSink>,
}

impl DispatcherBuilder {
    /// Start from a named configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, config: DispatcherConfig) -> Self {
        Self {
            name: name.into(),
            config,
            audit: None,
        }
    }

    /// Dispatcher name, used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration the dispatcher will be built from.
    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Record dispatcher events into `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: SharedAuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build with a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] when the configuration is invalid.
    pub fn build<T: TaskTransport>(self, transport: T) -> Result<Dispatcher<T>, DispatchError> {
        let dispatcher = Dispatcher::new(&self.config, transport).map_err(|e| match e {
            DispatchError::InvalidConfig(msg) => {
                DispatchError::InvalidConfig(format!("dispatcher `{}` invalid: {msg}", self.name))
            }
            other => other,
        })?;
        tracing::debug!(
            name = %self.name,
            request_capacity = self.config.request_capacity,
            token_capacity = self.config.token_capacity,
            "dispatcher built"
        );
        Ok(match self.audit {
            Some(audit) => dispatcher.with_audit(audit),
            None => dispatcher,
        })
    }

    /// Build with an [`HttpTransport`] using the configured timeouts.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or if the HTTP client cannot be built.
    pub fn build_http(self) -> Result<Dispatcher<HttpTransport>, DispatchError> {
        let transport = HttpTransport::from_config(&self.config)?;
        self.build(transport)
    }
}

/// Build one dispatcher per named configuration using `transport_factory`.
///
/// # Errors
///
/// Fails on the first invalid configuration or factory error.
pub fn build_dispatchers<T, F>(
    configs: &HashMap<String, DispatcherConfig>,
    mut transport_factory: F,
) -> Result<HashMap<String, Dispatcher<T>>, DispatchError>
where
    T: TaskTransport,
    F: FnMut(&str, &DispatcherConfig) -> Result<T, DispatchError>,
{
    if configs.is_empty() {
        return Err(DispatchError::InvalidConfig(
            "at least one dispatcher must be defined".into(),
        ));
    }
    let mut dispatchers = HashMap::with_capacity(configs.len());
    for (name, cfg) in configs {
        let transport = transport_factory(name, cfg)?;
        let dispatcher = DispatcherBuilder::new(name.clone(), cfg.clone()).build(transport)?;
        dispatchers.insert(name.clone(), dispatcher);
    }
    Ok(dispatchers)
}
