// src/proxy/backend.rs
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use hyper::body::{Bytes, HttpBody};
use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, HeaderValue, HOST};
use hyper::{Body, Client, Method, Request, Response, Uri};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use super::error::ProxyError;

/// Registration-time TCP probe budget. Failing fast here beats discovering a
/// dead address on the first forwarded request.
const CONNECT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Headers that are meaningful only for a single transport hop and must not
/// be relayed upstream or back to the caller (RFC 9110 §7.6.1).
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Why buffering an inbound body can fail: the caller sent more than the
/// configured cap, or the body stream broke mid-read.
#[derive(Debug)]
pub enum BodyBufferError {
    TooLarge { limit: usize },
    Read(hyper::Error),
}

/// An inbound request buffered for dispatch. The body is read once so the
/// failover loop can replay the same request against successive backends;
/// upstream response bodies are never buffered.
#[derive(Debug)]
pub struct BufferedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: Option<SocketAddr>,
}

impl BufferedRequest {
    /// Read the inbound body up to `max_bytes`. The cap bounds per-request
    /// memory; anything larger is rejected before a backend is selected.
    pub async fn buffer(
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
        max_bytes: usize,
    ) -> Result<Self, BodyBufferError> {
        let (parts, mut body) = req.into_parts();

        // A declared Content-Length over the cap is rejected without
        // reading a single frame.
        if body.size_hint().lower() > max_bytes as u64 {
            return Err(BodyBufferError::TooLarge { limit: max_bytes });
        }

        let mut buf = Vec::new();
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(BodyBufferError::Read)?;
            if buf.len() + chunk.len() > max_bytes {
                return Err(BodyBufferError::TooLarge { limit: max_bytes });
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: Bytes::from(buf),
            client_addr,
        })
    }
}

/// A single upstream target. The address is immutable after construction;
/// the liveness flag flips concurrently with request handling.
#[derive(Debug)]
pub struct Backend {
    pub id: String,
    pub url: Url,

    // Runtime state
    alive: AtomicBool,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,

    client: Client<HttpConnector, Body>,
    upstream_timeout: Duration,
}

impl Backend {
    pub fn new(url: Url, client: Client<HttpConnector, Body>, upstream_timeout: Duration) -> Self {
        let id = format!(
            "{}:{}",
            url.host_str().unwrap_or("unknown"),
            url.port_or_known_default().unwrap_or(80)
        );

        Self {
            id,
            url,
            alive: AtomicBool::new(true),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            client,
            upstream_timeout,
        }
    }

    /// Validate an address string and probe it, producing a ready backend.
    ///
    /// Accepts full `http://` / `https://` URLs or bare `host:port` (which is
    /// normalized to `http://`). Malformed or unreachable addresses are
    /// rejected here so registration fails fast.
    pub async fn resolve(
        addr: &str,
        client: Client<HttpConnector, Body>,
        upstream_timeout: Duration,
    ) -> Result<Self, ProxyError> {
        let url = parse_backend_url(addr)?;

        let authority = format!(
            "{}:{}",
            url.host_str().unwrap_or_default(),
            url.port_or_known_default().unwrap_or(80)
        );

        match timeout(CONNECT_PROBE_TIMEOUT, TcpStream::connect(&authority)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                return Err(ProxyError::InvalidBackend {
                    addr: addr.to_string(),
                    reason: format!("unreachable: {err}"),
                });
            }
            Err(_) => {
                return Err(ProxyError::InvalidBackend {
                    addr: addr.to_string(),
                    reason: format!("connect probe timed out after {CONNECT_PROBE_TIMEOUT:?}"),
                });
            }
        }

        Ok(Self::new(url, client, upstream_timeout))
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn failed_requests(&self) -> u64 {
        self.failed_requests.load(Ordering::Relaxed)
    }

    /// Relay a buffered request to this backend and stream the upstream
    /// response back. Connection refused, timeout, and protocol errors all
    /// surface as `BackendUnavailable`; retry policy lives in the balancer,
    /// never here.
    pub async fn forward(&self, req: &BufferedRequest) -> Result<Response<Body>, ProxyError> {
        let uri = self.rewrite_uri(&req.uri)?;

        let mut headers = req.headers.clone();
        strip_hop_by_hop(&mut headers);
        // Hyper derives the upstream Host from the rewritten URI.
        headers.remove(HOST);
        append_forwarded_for(&mut headers, req.client_addr);

        let mut outbound = Request::builder()
            .method(req.method.clone())
            .uri(uri)
            .body(Body::from(req.body.clone()))
            .map_err(|err| self.unavailable(format!("failed to build upstream request: {err}")))?;
        *outbound.headers_mut() = headers;

        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match timeout(self.upstream_timeout, self.client.request(outbound)).await {
            Ok(Ok(mut response)) => {
                strip_hop_by_hop(response.headers_mut());
                self.alive.store(true, Ordering::Relaxed);
                Ok(response)
            }
            Ok(Err(err)) => {
                self.record_failure();
                Err(self.unavailable(err.to_string()))
            }
            Err(_) => {
                self.record_failure();
                Err(self.unavailable(format!("no response within {:?}", self.upstream_timeout)))
            }
        }
    }

    fn rewrite_uri(&self, inbound: &Uri) -> Result<Uri, ProxyError> {
        let mut target = format!(
            "{}://{}:{}",
            self.url.scheme(),
            self.url.host_str().unwrap_or_default(),
            self.url.port_or_known_default().unwrap_or(80)
        );

        match inbound.path_and_query() {
            Some(pq) => target.push_str(pq.as_str()),
            None => target.push('/'),
        }

        target
            .parse::<Uri>()
            .map_err(|err| self.unavailable(format!("invalid upstream uri: {err}")))
    }

    fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.alive.store(false, Ordering::Relaxed);
    }

    fn unavailable(&self, reason: String) -> ProxyError {
        ProxyError::BackendUnavailable {
            addr: self.id.clone(),
            reason,
        }
    }
}

fn parse_backend_url(addr: &str) -> Result<Url, ProxyError> {
    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return Err(ProxyError::InvalidBackend {
            addr: addr.to_string(),
            reason: "empty address".to_string(),
        });
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|err| ProxyError::InvalidBackend {
        addr: addr.to_string(),
        reason: err.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ProxyError::InvalidBackend {
            addr: addr.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }

    if url.host_str().is_none() {
        return Err(ProxyError::InvalidBackend {
            addr: addr.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_addr: Option<SocketAddr>) {
    let Some(peer) = client_addr else {
        return;
    };

    let ip = peer.ip().to_string();
    let value = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {ip}"),
        None => ip,
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert("x-forwarded-for", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_port_is_normalized_to_http() {
        let url = parse_backend_url("127.0.0.1:3000").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.port(), Some(3000));
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let err = parse_backend_url("ftp://example.com").unwrap_err();
        assert!(matches!(err, ProxyError::InvalidBackend { .. }));
    }

    #[test]
    fn rejects_empty_address() {
        assert!(parse_backend_url("  ").is_err());
    }

    #[test]
    fn strips_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("accept", HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.get("connection").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert!(headers.get("accept").is_some());
    }

    #[test]
    fn appends_to_existing_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));

        let peer: SocketAddr = "192.168.1.5:54321".parse().unwrap();
        append_forwarded_for(&mut headers, Some(peer));

        assert_eq!(
            headers.get("x-forwarded-for").unwrap(),
            "10.0.0.1, 192.168.1.5"
        );
    }

    #[tokio::test]
    async fn body_over_the_cap_is_rejected() {
        let req = Request::builder()
            .uri("/")
            .body(Body::from(vec![0u8; 2048]))
            .unwrap();

        let err = BufferedRequest::buffer(req, None, 1024).await.unwrap_err();
        assert!(matches!(err, BodyBufferError::TooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn body_under_the_cap_is_kept_whole() {
        let req = Request::builder()
            .uri("/")
            .body(Body::from("small payload"))
            .unwrap();

        let buffered = BufferedRequest::buffer(req, None, 1024).await.unwrap();
        assert_eq!(buffered.body.as_ref(), b"small payload");
    }

    #[test]
    fn backend_id_is_host_and_port() {
        let url = Url::parse("http://localhost:9001").unwrap();
        let backend = Backend::new(url, Client::new(), Duration::from_secs(5));
        assert_eq!(backend.id, "localhost:9001");
    }
}
