// src/ipinfo.rs
//
// Client-IP detection service, a sibling of the dispatch core. Reports the
// caller's IP as seen through forwarding headers; it does not sit on the
// proxy data path.

use hyper::header::HeaderMap;
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct IpReport {
    pub ip: String,
    pub source: &'static str,
}

/// Walk the forwarding headers in trust order, falling back to the socket
/// peer address. Returns `None` only when nothing parses as an IP.
pub fn extract_client_ip(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Option<IpReport> {
    const HEADER_ORDER: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

    for source in HEADER_ORDER {
        let value = headers.get(source).and_then(|v| v.to_str().ok());
        if let Some(ip) = value.and_then(first_ip_in_list) {
            return Some(IpReport {
                ip: ip.to_string(),
                source,
            });
        }
    }

    remote_addr.map(|addr| IpReport {
        ip: addr.ip().to_string(),
        source: "remote-addr",
    })
}

/// First parseable IP in a comma-separated header value.
fn first_ip_in_list(value: &str) -> Option<IpAddr> {
    value
        .split(',')
        .map(str::trim)
        .find_map(|part| part.parse::<IpAddr>().ok())
}

pub async fn handle(req: Request<Body>, remote_addr: Option<SocketAddr>) -> Response<Body> {
    match (req.method(), req.uri().path()) {
        (&Method::OPTIONS, _) => with_cors(
            Response::builder()
                .status(StatusCode::NO_CONTENT)
                .body(Body::empty())
                .unwrap(),
        ),
        (&Method::GET, "/server/public-ip") => {
            let response = match extract_client_ip(req.headers(), remote_addr) {
                Some(report) => json_response(StatusCode::OK, &report),
                None => plain_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "unable to determine client IP",
                ),
            };
            with_cors(response)
        }
        (&Method::GET, "/healthz") => with_cors(plain_response(StatusCode::OK, "ok")),
        (&Method::GET, _) => with_cors(plain_response(StatusCode::NOT_FOUND, "not found")),
        _ => with_cors(plain_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed",
        )),
    }
}

fn json_response(status: StatusCode, report: &IpReport) -> Response<Body> {
    match serde_json::to_vec(report) {
        Ok(body) => Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap(),
        Err(err) => {
            tracing::error!(%err, "failed to encode ip report");
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, "encoding error")
        }
    }
}

fn plain_response(status: StatusCode, message: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(message))
        .unwrap()
}

fn with_cors(mut response: Response<Body>) -> Response<Body> {
    let headers = response.headers_mut();
    headers.insert(
        "access-control-allow-origin",
        hyper::header::HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-methods",
        hyper::header::HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        hyper::header::HeaderValue::from_static("Content-Type"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn remote() -> Option<SocketAddr> {
        Some("203.0.113.7:40000".parse().unwrap())
    }

    #[test]
    fn prefers_forwarded_for_over_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.4"));
        headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.1"));

        let report = extract_client_ip(&headers, remote()).unwrap();
        assert_eq!(report.ip, "198.51.100.4");
        assert_eq!(report.source, "x-forwarded-for");
    }

    #[test]
    fn takes_first_parseable_ip_from_list() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("garbage, 198.51.100.4, 10.0.0.1"),
        );

        let report = extract_client_ip(&headers, remote()).unwrap();
        assert_eq!(report.ip, "198.51.100.4");
    }

    #[test]
    fn falls_back_to_real_ip_then_remote_addr() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.1"));

        let report = extract_client_ip(&headers, remote()).unwrap();
        assert_eq!(report.source, "x-real-ip");

        let report = extract_client_ip(&HeaderMap::new(), remote()).unwrap();
        assert_eq!(report.ip, "203.0.113.7");
        assert_eq!(report.source, "remote-addr");
    }

    #[test]
    fn no_headers_no_remote_yields_none() {
        assert!(extract_client_ip(&HeaderMap::new(), None).is_none());
    }

    #[tokio::test]
    async fn healthz_returns_ok_with_cors() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();

        let resp = handle(req, remote()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn post_is_rejected() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/server/public-ip")
            .body(Body::empty())
            .unwrap();

        let resp = handle(req, remote()).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
