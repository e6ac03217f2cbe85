// src/proxy/error.rs
use hyper::{Body, Response, StatusCode};

/// Error taxonomy for the dispatch core.
///
/// `InvalidBackend` and `NoBackends` are configuration faults; the per-attempt
/// `BackendUnavailable` is consumed by the failover loop and only `Exhausted`
/// survives it.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid backend address {addr}: {reason}")]
    InvalidBackend { addr: String, reason: String },

    #[error("no backends registered")]
    NoBackends,

    #[error("backend {addr} unavailable: {reason}")]
    BackendUnavailable { addr: String, reason: String },

    #[error("all backends failed after {attempts} attempts")]
    Exhausted { attempts: usize },
}

// Convert ProxyError to a Hyper response so the handler can always answer the
// caller instead of dropping the connection.
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let (status, message) = match err {
            ProxyError::NoBackends => (StatusCode::BAD_REQUEST, "no backends registered"),
            ProxyError::Exhausted { .. } | ProxyError::BackendUnavailable { .. } => {
                (StatusCode::BAD_GATEWAY, "all backends failed")
            }
            ProxyError::InvalidBackend { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "load balancer misconfigured",
            ),
        };

        Response::builder()
            .status(status)
            .header("content-type", "text/plain; charset=utf-8")
            .body(Body::from(message))
            .unwrap()
    }
}
