use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use httpmeter_core::attributes::LabelMappingFn;
use httpmeter_core::catalog::{sanitize_name, NamingMode};
use httpmeter_core::settings::metrics::MetricsSettings;
use prometheus::Registry;

use super::exposition::Gatherer;

/// Decides whether a request is exempt from measurement.
pub type SkipperFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Construction-time configuration of [`super::HttpMetrics`].
///
/// Read-only once the middleware is built.
#[derive(Clone)]
pub struct MiddlewareConfig {
    pub(crate) service_name: String,
    pub(crate) service_version: String,
    pub(crate) namespace: Option<String>,
    pub(crate) metrics_path: String,
    pub(crate) naming_mode: NamingMode,
    pub(crate) scope_info: bool,
    pub(crate) track_in_flight: bool,
    pub(crate) skipper: Option<SkipperFn>,
    pub(crate) route_label: Option<LabelMappingFn>,
    pub(crate) host_label: Option<LabelMappingFn>,
    registry: Option<Registry>,
    registerer: Option<Registry>,
    gatherer: Option<Arc<dyn Gatherer>>,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self::from_settings(&MetricsSettings::default())
    }
}

impl MiddlewareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &MetricsSettings) -> Self {
        let config = Self {
            service_name: settings.service_name.clone(),
            service_version: settings.service_version.clone(),
            namespace: settings.namespace.clone(),
            metrics_path: settings.path.clone(),
            naming_mode: settings.naming_mode,
            scope_info: settings.scope_info,
            track_in_flight: settings.track_in_flight,
            skipper: None,
            route_label: None,
            host_label: None,
            registry: None,
            registerer: None,
            gatherer: None,
        };

        if settings.skip_paths.is_empty() {
            return config;
        }

        let skip_paths = settings.skip_paths.clone();
        config.with_skipper(move |request: &Request| {
            skip_paths.iter().any(|path| path == request.uri().path())
        })
    }

    pub fn with_service(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.service_name = name.into();
        self.service_version = version.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = path.into();
        self
    }

    pub fn with_naming_mode(mut self, mode: NamingMode) -> Self {
        self.naming_mode = mode;
        self
    }

    /// Has no effect in [`NamingMode::Compatible`].
    pub fn with_scope_info(mut self, enabled: bool) -> Self {
        self.scope_info = enabled;
        self
    }

    pub fn with_in_flight(mut self, enabled: bool) -> Self {
        self.track_in_flight = enabled;
        self
    }

    pub fn with_skipper<F>(mut self, skipper: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skipper = Some(Arc::new(skipper));
        self
    }

    pub fn with_route_label<F>(mut self, mapping: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.route_label = Some(Arc::new(mapping));
        self
    }

    pub fn with_host_label<F>(mut self, mapping: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.host_label = Some(Arc::new(mapping));
        self
    }

    /// Registers into and gathers from `registry`, overriding any
    /// registerer or gatherer set separately.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_registerer(mut self, registerer: Registry) -> Self {
        self.registerer = Some(registerer);
        self
    }

    pub fn with_gatherer(mut self, gatherer: Arc<dyn Gatherer>) -> Self {
        self.gatherer = Some(gatherer);
        self
    }

    /// Prefix of every exported metric name.
    pub fn namespace(&self) -> String {
        sanitize_name(self.namespace.as_deref().unwrap_or(&self.service_name))
    }

    pub(crate) fn registerer(&self) -> Registry {
        self.registry
            .as_ref()
            .or(self.registerer.as_ref())
            .cloned()
            .unwrap_or_else(|| prometheus::default_registry().clone())
    }

    pub(crate) fn gatherer(&self) -> Arc<dyn Gatherer> {
        if let Some(registry) = &self.registry {
            return Arc::new(registry.clone());
        }
        match &self.gatherer {
            Some(gatherer) => gatherer.clone(),
            None => Arc::new(self.registerer()),
        }
    }
}

impl fmt::Debug for MiddlewareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareConfig")
            .field("service_name", &self.service_name)
            .field("service_version", &self.service_version)
            .field("namespace", &self.namespace())
            .field("metrics_path", &self.metrics_path)
            .field("naming_mode", &self.naming_mode)
            .field("scope_info", &self.scope_info)
            .field("track_in_flight", &self.track_in_flight)
            .field("skipper", &self.skipper.is_some())
            .field("route_label", &self.route_label.is_some())
            .field("host_label", &self.host_label.is_some())
            .field("registry", &self.registry.is_some())
            .finish()
    }
}
