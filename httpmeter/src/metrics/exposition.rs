//! Prometheus text exposition
//!
//! Serves whatever the configured gatherer holds. Aggregation and snapshot
//! consistency are the gatherer's concern.

use std::io::Write;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{error, trace};

use super::{HttpMetrics, MetricsError};

/// Read side of a metrics registry.
pub trait Gatherer: Send + Sync {
    fn gather(&self) -> Result<Vec<MetricFamily>, MetricsError>;
}

impl Gatherer for Registry {
    fn gather(&self) -> Result<Vec<MetricFamily>, MetricsError> {
        Ok(Registry::gather(self))
    }
}

/// Gathers from `gatherer` and writes the text exposition format to `writer`.
pub fn write_gathered_metrics<W: Write>(
    writer: &mut W,
    gatherer: &dyn Gatherer,
) -> Result<(), MetricsError> {
    let families = gatherer.gather()?;
    TextEncoder::new()
        .encode(&families, writer)
        .map_err(|e| MetricsError::Encode(e.to_string()))
}

pub async fn metrics_handler(
    State(metrics): State<Arc<HttpMetrics>>,
) -> Result<Response, MetricsError> {
    let mut buffer = Vec::new();
    write_gathered_metrics(&mut buffer, metrics.gatherer().as_ref()).inspect_err(|e| {
        error!("Failed to serve metrics: {}", e);
    })?;
    trace!(bytes = buffer.len(), "Serving metrics");

    let content_type = TextEncoder::new().format_type().to_string();
    Ok(([(header::CONTENT_TYPE, content_type)], buffer).into_response())
}
