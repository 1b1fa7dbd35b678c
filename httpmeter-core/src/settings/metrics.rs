use serde::{Deserialize, Serialize};

use crate::catalog::{sanitize_name, NamingMode};

/// Metrics configuration as read from configuration files and environment.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Reported as `service.name`; also the default namespace
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default)]
    pub service_version: String,

    /// Prefix of every exported metric name
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default = "default_metrics_path")]
    pub path: String,

    #[serde(default)]
    pub naming_mode: NamingMode,

    /// Adds the `otel_scope_*` labels. Ignored in compatible mode.
    #[serde(default)]
    pub scope_info: bool,

    #[serde(default = "default_track_in_flight")]
    pub track_in_flight: bool,

    /// Request paths that are never measured
    #[serde(default)]
    pub skip_paths: Vec<String>,
}

fn default_service_name() -> String {
    "axum".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_track_in_flight() -> bool {
    true
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_version: String::new(),
            namespace: None,
            path: default_metrics_path(),
            naming_mode: NamingMode::default(),
            scope_info: false,
            track_in_flight: default_track_in_flight(),
            skip_paths: Vec::new(),
        }
    }
}

impl MetricsSettings {
    /// The configured namespace, or the service name, as a valid metric
    /// name prefix (`-` and other invalid characters become `_`).
    pub fn resolved_namespace(&self) -> String {
        sanitize_name(self.namespace.as_deref().unwrap_or(&self.service_name))
    }
}
