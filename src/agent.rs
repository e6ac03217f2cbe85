// src/agent.rs
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::load_balancer::{create_load_balancer, LoadBalancer};
use crate::metrics::MetricsRegistry;
use crate::server::{RequestHandler, ServerBuilder};

/// Composition root: builds the balancer, registers every configured backend
/// before the listener starts, then serves until shutdown.
pub struct Agent {
    config: Config,
    lb: Arc<dyn LoadBalancer>,
}

impl Agent {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let metrics = if config.metrics.enabled {
            let registry = MetricsRegistry::new()?;
            let collector = registry.collector();

            let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
            let path = config.metrics.path.clone();
            tokio::spawn(async move {
                if let Err(err) =
                    crate::metrics::start_metrics_server(metrics_addr, registry, path).await
                {
                    tracing::error!(%err, "failed to start metrics server");
                }
            });

            Some(collector)
        } else {
            None
        };

        let lb = create_load_balancer(&config, metrics);

        Ok(Self { config, lb })
    }

    pub async fn run(self) -> Result<()> {
        // Registration is fail-fast: a malformed or unreachable address
        // aborts startup instead of surfacing on the first request.
        for addr in &self.config.backends {
            self.lb
                .register_backend(addr)
                .await
                .with_context(|| format!("failed to register backend {addr}"))?;
        }

        tracing::info!(
            backends = self.config.backends.len(),
            algorithm = self.lb.name(),
            "backend pool ready"
        );

        let handler = RequestHandler::new(self.lb.clone());

        ServerBuilder::new(self.config.listen_addr)
            .with_handler(handler)
            .serve()
            .await
    }
}
