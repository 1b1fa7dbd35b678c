use axum::http::StatusCode;
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use httpmeter_core::error::CatalogError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Invalid instrument definition: {0}")]
    InvalidInstrument(#[from] CatalogError),

    #[error("Invalid histogram view for {pattern}: {reason}")]
    View {
        pattern: &'static str,
        reason: String,
    },

    #[error("Failed to build Prometheus exporter: {0}")]
    Exporter(String),

    #[error("Failed to register metrics collector: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("Failed to gather metrics: {0}")]
    Gather(String),

    #[error("Failed to encode metrics: {0}")]
    Encode(String),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": true, "message": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
