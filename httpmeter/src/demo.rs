//! Demo application served by the `httpmeter` binary.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Router,
};
use httpmeter_core::error::HandlerError;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};

use crate::metrics::HttpMetrics;

#[derive(Clone)]
pub struct DemoState {
    requests: Counter<u64>,
    exec_cost: Histogram<f64>,
}

impl DemoState {
    /// Instruments come from the global meter provider, so they are only
    /// exported once [`HttpMetrics`] installed its provider.
    pub fn new() -> Self {
        let meter = global::meter("httpmeter-demo");
        Self {
            requests: meter
                .u64_counter("demo.requests")
                .with_description("Requests served by the demo handler")
                .build(),
            exec_cost: meter
                .f64_histogram("demo.exec.cost")
                .with_description("Time spent in the demo handler")
                .with_unit("s")
                .build(),
        }
    }
}

impl Default for DemoState {
    fn default() -> Self {
        Self::new()
    }
}

async fn hello(State(demo): State<DemoState>) -> &'static str {
    let started = Instant::now();
    demo.requests.add(1, &[KeyValue::new("handler", "hello")]);
    demo.exec_cost
        .record(started.elapsed().as_secs_f64(), &[KeyValue::new("handler", "hello")]);
    "Hello, World!"
}

async fn customer(Path(name): Path<String>) -> String {
    format!("Hello, {name}!")
}

async fn health() -> &'static str {
    "OK"
}

async fn conflict() -> Result<String, HandlerError> {
    Err(HandlerError::status(
        StatusCode::CONFLICT,
        "Customer already exists",
    ))
}

async fn fail() -> Result<String, HandlerError> {
    Err(anyhow::anyhow!("Backend unavailable").into())
}

/// Demo routes wrapped in the metrics middleware, with the exposition
/// endpoint mounted.
pub fn router(metrics: &Arc<HttpMetrics>) -> Router {
    let app = Router::new()
        .route("/", get(hello))
        .route("/customer/{name}", get(customer))
        .route("/health", get(health))
        .route("/conflict", get(conflict))
        .route("/fail", get(fail))
        .with_state(DemoState::new());

    metrics.setup(app)
}
