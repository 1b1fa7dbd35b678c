use std::sync::Arc;
use std::time::Instant;

use axum::http::Method;
use axum::{extract::Request, extract::State, middleware::Next, response::Response};
use httpmeter_core::attributes::{resolve_status, RequestLabels};
use httpmeter_core::error::ObservedError;
use httpmeter_core::size::{approximate_request_size, response_size};
use opentelemetry::metrics::UpDownCounter;
use opentelemetry::KeyValue;
use tracing::trace;

use super::HttpMetrics;

/// Measurement state between request entry and exit.
struct PendingRequest {
    started: Instant,
    method: Method,
    request_size: u64,
    labels: RequestLabels,
}

/// Keeps the in-flight counter incremented until dropped.
///
/// Dropping also happens when the request future is cancelled or the
/// handler panics, so the counter cannot drift.
struct InFlightGuard {
    counter: UpDownCounter<i64>,
    attributes: Vec<KeyValue>,
}

impl InFlightGuard {
    fn enter(counter: &UpDownCounter<i64>, attributes: Vec<KeyValue>) -> Self {
        counter.add(1, &attributes);
        Self {
            counter: counter.clone(),
            attributes,
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.add(-1, &self.attributes);
    }
}

/// HTTP metrics middleware
///
/// Records request count, duration, request size and response size for
/// every request that is neither the metrics endpoint nor skipped, and
/// tracks requests in flight when enabled. Install it with
/// [`HttpMetrics::setup`] or `middleware::from_fn_with_state`.
pub async fn track_metrics(
    State(metrics): State<Arc<HttpMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    if metrics.skips(&request) {
        trace!(path = request.uri().path(), "Skipping metrics");
        return next.run(request).await;
    }

    let pending = PendingRequest {
        started: Instant::now(),
        method: request.method().clone(),
        request_size: approximate_request_size(&request),
        labels: RequestLabels::extract(&request, &metrics.route_label, &metrics.host_label),
    };

    let in_flight = metrics.instruments.active_requests.as_ref().map(|counter| {
        let attributes =
            pending
                .labels
                .attributes(metrics.catalog, metrics.instruments.in_flight_labels, None);
        InFlightGuard::enter(counter, attributes)
    });

    let response = next.run(request).await;

    drop(in_flight);
    record(&metrics, pending, &response);

    response
}

fn record(metrics: &HttpMetrics, pending: PendingRequest, response: &Response) {
    let status = resolve_status(
        response.status().as_u16(),
        response.extensions().get::<ObservedError>(),
    );
    let elapsed = metrics.catalog.duration_scale().convert(pending.started.elapsed());
    let response_size = response_size(&pending.method, response);

    let attributes =
        pending
            .labels
            .attributes(metrics.catalog, metrics.instruments.labels, Some(status));

    let instruments = &metrics.instruments;
    instruments.requests.add(1, &attributes);
    instruments.request_duration.record(elapsed, &attributes);
    instruments.request_size.record(pending.request_size, &attributes);
    instruments.response_size.record(response_size, &attributes);

    trace!(
        method = %pending.labels.method,
        route = %pending.labels.route,
        status,
        elapsed,
        "Recorded request metrics"
    );
}
