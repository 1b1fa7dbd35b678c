use axum::http::StatusCode;
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::catalog::{InstrumentId, NamingMode};

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("Invalid instrument name: {0}")]
    InvalidName(String),

    #[error("Invalid unit {unit} for instrument {name}")]
    InvalidUnit { name: String, unit: String },

    #[error("Catalog {mode:?} does not define instrument {id:?}")]
    MissingInstrument { mode: NamingMode, id: InstrumentId },
}

/// Response extension left behind by a handler error.
///
/// The instrumentation reads it to tell an errored request apart from a
/// regular response and to pick up the status code the error carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedError {
    status: Option<StatusCode>,
}

impl ObservedError {
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
        }
    }

    pub fn untyped() -> Self {
        Self { status: None }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Marks `response` as the result of a failed handler.
    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Error type for handlers behind the instrumentation.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        HandlerError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            HandlerError::Status { status, .. } => Some(*status),
            HandlerError::Other(_) => None,
        }
    }

    fn observed(&self) -> ObservedError {
        match self.status_code() {
            Some(status) => ObservedError::with_status(status),
            None => ObservedError::untyped(),
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let observed = self.observed();
        let status = self
            .status_code()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({ "error": true, "message": self.to_string() });

        let mut response = (status, Json(body)).into_response();
        observed.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_error_keeps_its_status() {
        let response = HandlerError::status(StatusCode::CONFLICT, "already exists").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.extensions().get::<ObservedError>(),
            Some(&ObservedError::with_status(StatusCode::CONFLICT))
        );
    }

    #[test]
    fn test_untyped_error_renders_as_server_error() {
        let response = HandlerError::from(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let observed = response.extensions().get::<ObservedError>().unwrap();
        assert_eq!(observed.status(), None);
    }
}
