//! Attribute extraction
//!
//! Pure functions that turn a request/response pair into the label values
//! recorded with every measurement.

use std::sync::Arc;

use axum::extract::{MatchedPath, Request};
use axum::http::{header, HeaderMap, StatusCode};
use opentelemetry::KeyValue;

use crate::catalog::{Catalog, Label};
use crate::error::ObservedError;

/// Maps a request to a label value.
///
/// Used to keep label cardinality bounded. For a `/customer/{name}` route
/// that should not produce one time series per customer, a mapping like
///
/// ```
/// # use axum::extract::Request;
/// fn customer_route(request: &Request) -> String {
///     let path = request.uri().path();
///     match path.strip_prefix("/customer/") {
///         Some(_) => "/customer/:name".to_string(),
///         None => path.to_string(),
///     }
/// }
/// ```
///
/// collapses `/customer/alice` and `/customer/bob` into `/customer/:name`.
pub type LabelMappingFn = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Route label of the matched route template.
pub fn default_route_label() -> LabelMappingFn {
    Arc::new(|request: &Request| matched_route(request))
}

/// Host label from the `Host` header.
pub fn default_host_label() -> LabelMappingFn {
    Arc::new(|request: &Request| request_host(request))
}

/// The route template the router matched, empty when nothing matched.
pub fn matched_route<B>(request: &axum::http::Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_default()
}

/// The `Host` header, falling back to the authority of the request URI.
pub fn request_host<B>(request: &axum::http::Request<B>) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))
        .unwrap_or_default()
}

/// `http` or `https`.
///
/// Uses the URI scheme when the request carries an absolute URI, otherwise
/// the usual reverse proxy headers.
pub fn request_scheme<B>(request: &axum::http::Request<B>) -> &'static str {
    if let Some(scheme) = request.uri().scheme_str() {
        return normalize_scheme(scheme);
    }
    scheme_from_headers(request.headers()).unwrap_or("http")
}

fn scheme_from_headers(headers: &HeaderMap) -> Option<&'static str> {
    let value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(scheme) = value("x-forwarded-proto").or_else(|| value("x-forwarded-protocol")) {
        return Some(normalize_scheme(scheme));
    }
    if value("x-forwarded-ssl").is_some_and(|v| v.eq_ignore_ascii_case("on")) {
        return Some("https");
    }
    value("x-url-scheme").map(normalize_scheme)
}

fn normalize_scheme(scheme: &str) -> &'static str {
    if scheme.eq_ignore_ascii_case("https") {
        "https"
    } else {
        "http"
    }
}

/// Resolves the status code label.
///
/// Without an error the response status is used as is. An error carrying a
/// status wins over the response status, and an error must never be
/// reported as unset or `200`.
pub fn resolve_status(response_status: u16, error: Option<&ObservedError>) -> u16 {
    let Some(error) = error else {
        return response_status;
    };

    let status = error
        .status()
        .map(|status| status.as_u16())
        .unwrap_or(response_status);

    if status == 0 || status == StatusCode::OK.as_u16() {
        StatusCode::INTERNAL_SERVER_ERROR.as_u16()
    } else {
        status
    }
}

/// Label values captured when a request enters the instrumentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLabels {
    pub method: String,
    pub route: String,
    pub host: String,
    pub scheme: &'static str,
}

impl RequestLabels {
    pub fn extract(request: &Request, route: &LabelMappingFn, host: &LabelMappingFn) -> Self {
        Self {
            method: request.method().as_str().to_string(),
            route: route(request),
            host: host(request),
            scheme: request_scheme(request),
        }
    }

    /// Builds the attribute set for an instrument declaring `labels`.
    ///
    /// Instruments recorded before the status is known never declare
    /// [`Label::StatusCode`], so `status` is only `None` for those.
    pub fn attributes(
        &self,
        catalog: &Catalog,
        labels: &[Label],
        status: Option<u16>,
    ) -> Vec<KeyValue> {
        labels
            .iter()
            .filter_map(|label| {
                let key = catalog.label_key(*label);
                match label {
                    Label::Method => Some(KeyValue::new(key, self.method.clone())),
                    Label::StatusCode => status.map(|status| KeyValue::new(key, i64::from(status))),
                    Label::Route => Some(KeyValue::new(key, self.route.clone())),
                    Label::Host => Some(KeyValue::new(key, self.host.clone())),
                    Label::Scheme => Some(KeyValue::new(key, self.scheme)),
                }
            })
            .collect()
    }
}
