#![allow(dead_code)]

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, response::Response, routing::get, Router};
use axum_test::TestServer;
use httpmeter::{HttpMetrics, MiddlewareConfig};
use httpmeter_core::catalog::NamingMode;
use httpmeter_core::error::{HandlerError, ObservedError};
use prometheus::Registry;

/// Config exporting into a fresh registry, so tests never share series.
pub fn isolated_config(mode: NamingMode, namespace: &str) -> MiddlewareConfig {
    MiddlewareConfig::new()
        .with_naming_mode(mode)
        .with_namespace(namespace)
        .with_registry(Registry::new())
}

pub fn routes() -> Router {
    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route("/health", get(|| async { "OK" }))
        .route(
            "/customer/{name}",
            get(|axum::extract::Path(name): axum::extract::Path<String>| async move {
                format!("Hello, {name}!")
            }),
        )
        .route("/conflict", get(conflict))
        .route("/fail", get(fail))
        .route("/bad-gateway", get(|| async { StatusCode::BAD_GATEWAY }))
        .route("/masked", get(masked))
}

async fn conflict() -> Result<String, HandlerError> {
    Err(HandlerError::status(StatusCode::CONFLICT, "Customer already exists"))
}

async fn fail() -> Result<String, HandlerError> {
    Err(anyhow::anyhow!("Backend unavailable").into())
}

/// A successful response that still reports an error without a status.
async fn masked() -> Response {
    let mut response = "partial".into_response();
    ObservedError::untyped().attach(&mut response);
    response
}

pub fn server(config: MiddlewareConfig) -> (TestServer, Arc<HttpMetrics>) {
    let metrics = Arc::new(HttpMetrics::new(config).unwrap());
    let server = TestServer::new(metrics.setup(routes())).unwrap();
    (server, metrics)
}

pub async fn scrape(server: &TestServer) -> String {
    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.text()
}

/// Value of the first sample of `metric` carrying all of `labels`.
///
/// Label order in the exposition does not matter and extra labels on the
/// sample are ignored.
pub fn series_value(body: &str, metric: &str, labels: &[(&str, &str)]) -> Option<f64> {
    body.lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(parse_sample)
        .find(|(name, sample_labels, _)| {
            name == metric
                && labels
                    .iter()
                    .all(|(k, v)| sample_labels.iter().any(|(sk, sv)| sk == k && sv == v))
        })
        .map(|(_, _, value)| value)
}

/// Sum over all samples of `metric` carrying all of `labels`.
pub fn series_sum(body: &str, metric: &str, labels: &[(&str, &str)]) -> f64 {
    body.lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(parse_sample)
        .filter(|(name, sample_labels, _)| {
            name == metric
                && labels
                    .iter()
                    .all(|(k, v)| sample_labels.iter().any(|(sk, sv)| sk == k && sv == v))
        })
        .map(|(_, _, value)| value)
        .sum()
}

type Sample = (String, Vec<(String, String)>, f64);

fn parse_sample(line: &str) -> Option<Sample> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (name, labels, rest) = match line.find('{') {
        Some(open) => {
            let close = line.rfind('}')?;
            (
                &line[..open],
                parse_labels(&line[open + 1..close])?,
                &line[close + 1..],
            )
        }
        None => {
            let (name, rest) = line.split_once(' ')?;
            (name, Vec::new(), rest)
        }
    };

    let value = rest.split_whitespace().next()?.parse().ok()?;
    Some((name.to_string(), labels, value))
}

fn parse_labels(mut input: &str) -> Option<Vec<(String, String)>> {
    let mut labels = Vec::new();
    loop {
        input = input.trim_start_matches(',');
        if input.is_empty() {
            return Some(labels);
        }

        let (key, rest) = input.split_once("=\"")?;
        let mut value = String::new();
        let mut chars = rest.char_indices();
        let end = loop {
            match chars.next()? {
                (_, '\\') => {
                    let (_, escaped) = chars.next()?;
                    value.push(match escaped {
                        'n' => '\n',
                        other => other,
                    });
                }
                (i, '"') => break i,
                (_, c) => value.push(c),
            }
        };

        labels.push((key.to_string(), value));
        input = &rest[end + 1..];
    }
}

#[test]
fn test_series_value_parses_labels_in_any_order() {
    let body = "# TYPE x_total counter\n\
                x_total{url=\"/customer/{name}\",code=\"200\"} 2\n\
                x_total{code=\"404\",url=\"\"} 1\n\
                y 3.5\n";
    assert_eq!(series_value(body, "x_total", &[("code", "404"), ("url", "")]), Some(1.0));
    assert_eq!(
        series_value(body, "x_total", &[("url", "/customer/{name}")]),
        Some(2.0)
    );
    assert_eq!(series_value(body, "y", &[]), Some(3.5));
    assert_eq!(series_value(body, "x_total", &[("code", "500")]), None);
    assert_eq!(series_sum(body, "x_total", &[]), 3.0);
}
