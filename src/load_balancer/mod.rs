// src/load_balancer/mod.rs
mod round_robin;

pub use round_robin::RoundRobinBalancer;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Body, Request, Response};

use crate::config::Config;
use crate::metrics::MetricsCollector;
use crate::proxy::ProxyError;

/// Capability set of a dispatcher: register backends at startup, then handle
/// inbound requests for the life of the process. The rotation policy is an
/// implementation detail behind this seam.
#[async_trait]
pub trait LoadBalancer: Send + Sync {
    /// Append a backend to the rotation. Fails fast on a malformed or
    /// unreachable address; must be callable concurrently with dispatch.
    async fn register_backend(&self, addr: &str) -> Result<(), ProxyError>;

    /// Drive one inbound request to a terminal state: a passed-through
    /// upstream response, or an error the handler turns into exactly one
    /// synthesized response.
    async fn dispatch(
        &self,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<Body>, ProxyError>;

    fn name(&self) -> &'static str;
}

pub fn create_load_balancer(
    config: &Config,
    metrics: Option<Arc<MetricsCollector>>,
) -> Arc<dyn LoadBalancer> {
    Arc::new(RoundRobinBalancer::new(
        config.upstream_timeout(),
        config.max_body_bytes,
        metrics,
    ))
}
