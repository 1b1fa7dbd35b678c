//! httpmeter
//!
//! OpenTelemetry HTTP metrics for axum services, exposed in the Prometheus
//! text format. The demo server modules back the `httpmeter` binary.

pub mod demo;
pub mod http;
pub mod init_telemetry;
pub mod metrics;
pub mod settings;
pub mod shutdown;

pub use metrics::{HttpMetrics, MetricsError, MiddlewareConfig};
