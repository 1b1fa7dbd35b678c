//! Request and response size estimates.

use axum::body::HttpBody;
use axum::http::{header, HeaderMap, Method, Request, Response, Version};

use crate::attributes::request_host;

fn protocol(version: Version) -> &'static str {
    if version == Version::HTTP_09 {
        "HTTP/0.9"
    } else if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else if version == Version::HTTP_2 {
        "HTTP/2.0"
    } else if version == Version::HTTP_3 {
        "HTTP/3.0"
    } else {
        "HTTP/1.1"
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Approximate wire size of an inbound request.
///
/// Sums path, method, protocol, header names and values and the host, plus
/// the declared body length when one is known. The `Host` header only counts
/// once, through the host string.
pub fn approximate_request_size<B: HttpBody>(request: &Request<B>) -> u64 {
    let mut size = request.uri().path().len()
        + request.method().as_str().len()
        + protocol(request.version()).len()
        + request_host(request).len();

    size += request
        .headers()
        .iter()
        .filter(|(name, _)| *name != header::HOST)
        .map(|(name, value)| name.as_str().len() + value.len())
        .sum::<usize>();

    let body = content_length(request.headers()).or_else(|| request.body().size_hint().exact());

    (size as u64).saturating_add(body.unwrap_or(0))
}

/// Body size of an outgoing response.
///
/// Falls back to the lower bound of the body size hint for streamed bodies.
/// Responses to `HEAD` carry no body on the wire, whatever `Content-Length`
/// announces.
pub fn response_size<B: HttpBody>(method: &Method, response: &Response<B>) -> u64 {
    if method == Method::HEAD {
        return 0;
    }
    content_length(response.headers()).unwrap_or_else(|| {
        let hint = response.body().size_hint();
        hint.exact().unwrap_or(hint.lower())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn ping() -> axum::http::request::Builder {
        Request::builder()
            .uri("/ping")
            .header(header::HOST, "example.com")
            .header("x-a", "bc")
    }

    #[test]
    fn test_request_size_without_body() {
        // "/ping" + "GET" + "HTTP/1.1" + "x-a" + "bc" + "example.com"
        let request = ping().body(Body::empty()).unwrap();
        assert_eq!(approximate_request_size(&request), 32);
    }

    #[test]
    fn test_request_size_adds_declared_content_length() {
        let request = ping()
            .method("POST")
            .header(header::CONTENT_LENGTH, "100")
            .body(Body::empty())
            .unwrap();
        // one more byte of method, "content-length" + "100", plus the body
        assert_eq!(approximate_request_size(&request), 32 + 1 + 14 + 3 + 100);
    }

    #[test]
    fn test_request_size_uses_exact_body_hint() {
        let request = ping().body(Body::from("hello")).unwrap();
        assert_eq!(approximate_request_size(&request), 32 + 5);
    }

    #[test]
    fn test_request_size_protocol_follows_version() {
        let request = ping()
            .version(Version::HTTP_2)
            .body(Body::empty())
            .unwrap();
        assert_eq!(approximate_request_size(&request), 32);
    }

    #[test]
    fn test_response_size() {
        let response = Response::new(Body::from("hello world"));
        assert_eq!(response_size(&Method::GET, &response), 11);

        let response = Response::builder()
            .header(header::CONTENT_LENGTH, "42")
            .body(Body::empty())
            .unwrap();
        assert_eq!(response_size(&Method::GET, &response), 42);

        assert_eq!(response_size(&Method::GET, &Response::new(Body::empty())), 0);
    }

    #[test]
    fn test_head_response_has_no_body() {
        let response = Response::builder()
            .header(header::CONTENT_LENGTH, "42")
            .body(Body::from("x".repeat(42)))
            .unwrap();
        assert_eq!(response_size(&Method::HEAD, &response), 0);
    }

    #[test]
    fn test_request_size_saturates_on_huge_content_length() {
        let request = ping()
            .header(header::CONTENT_LENGTH, "18446744073709551613")
            .body(Body::empty())
            .unwrap();
        assert_eq!(approximate_request_size(&request), u64::MAX);
    }
}
