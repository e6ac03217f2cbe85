// src/load_balancer/round_robin.rs
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::load_balancer::LoadBalancer;
use crate::metrics::MetricsCollector;
use crate::proxy::{Backend, BackendPool, BodyBufferError, BufferedRequest, ProxyError};

/// Strict round-robin dispatcher over a static backend set.
///
/// Every backend stays in rotation regardless of its liveness flag; a failed
/// delivery triggers failover to the next backend, bounded by the pool size,
/// so an unhealthy backend costs one wasted attempt per rotation rather than
/// being tracked by a health checker.
pub struct RoundRobinBalancer {
    pool: BackendPool,
    client: Client<HttpConnector, Body>,
    upstream_timeout: Duration,
    max_body_bytes: usize,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RoundRobinBalancer {
    pub fn new(
        upstream_timeout: Duration,
        max_body_bytes: usize,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            pool: BackendPool::new(),
            client: Client::new(),
            upstream_timeout,
            max_body_bytes,
            metrics,
        }
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }
}

#[async_trait]
impl LoadBalancer for RoundRobinBalancer {
    async fn register_backend(&self, addr: &str) -> Result<(), ProxyError> {
        let backend =
            Backend::resolve(addr, self.client.clone(), self.upstream_timeout).await?;
        info!(backend = %backend.id, "registered backend");

        self.pool.add(Arc::new(backend)).await;

        if let Some(metrics) = &self.metrics {
            metrics.set_pool_size(self.pool.len().await);
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<Body>, ProxyError> {
        let buffered = match BufferedRequest::buffer(req, client_addr, self.max_body_bytes).await
        {
            Ok(buffered) => buffered,
            Err(BodyBufferError::TooLarge { limit }) => {
                warn!(limit, "rejecting oversize request body");
                return Ok(Response::builder()
                    .status(StatusCode::PAYLOAD_TOO_LARGE)
                    .body(Body::from(format!("request body exceeds {limit} bytes")))
                    .unwrap());
            }
            Err(BodyBufferError::Read(err)) => {
                // The caller aborted or sent a broken body; there is nothing
                // to replay, so answer 400 and move on.
                warn!(%err, "failed to read inbound request body");
                return Ok(Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(Body::from("unreadable request body"))
                    .unwrap());
            }
        };

        let attempts = self.pool.len().await.max(1);
        let started = std::time::Instant::now();

        for attempt in 1..=attempts {
            let backend = self.pool.next().await?;
            debug!(backend = %backend.id, attempt, "forwarding request");

            match backend.forward(&buffered).await {
                Ok(response) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_request(
                            &backend.id,
                            response.status().as_u16(),
                            started.elapsed(),
                        );
                        metrics.set_backend_up(&backend.id, backend.is_alive());
                    }
                    return Ok(response);
                }
                Err(ProxyError::BackendUnavailable { reason, .. }) => {
                    warn!(
                        backend = %backend.id,
                        %reason,
                        attempt,
                        attempts,
                        "backend unavailable, failing over"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_failover(&backend.id);
                        metrics.set_backend_up(&backend.id, backend.is_alive());
                    }
                }
                Err(other) => return Err(other),
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_exhausted();
        }
        Err(ProxyError::Exhausted { attempts })
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
