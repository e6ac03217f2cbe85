// src/server/handler.rs
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::{Body, Request, Response};
use tower::Service;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

use crate::load_balancer::LoadBalancer;

/// Tower service wrapping the balancer. Cloned once per accepted connection
/// with the peer address attached, so every dispatch knows its caller.
#[derive(Clone)]
pub struct RequestHandler {
    lb: Arc<dyn LoadBalancer>,
    peer: Option<SocketAddr>,
}

impl RequestHandler {
    pub fn new(lb: Arc<dyn LoadBalancer>) -> Self {
        Self { lb, peer: None }
    }

    pub fn for_peer(&self, peer: SocketAddr) -> Self {
        Self {
            lb: self.lb.clone(),
            peer: Some(peer),
        }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Box<dyn std::error::Error + Send + Sync>;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let lb = self.lb.clone();
        let peer = self.peer;

        let request_id = Uuid::new_v4();
        let span = info_span!(
            "request",
            %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        Box::pin(
            async move {
                // Every inbound request gets exactly one response; terminal
                // errors become synthesized responses instead of dropped
                // connections.
                let response = match lb.dispatch(req, peer).await {
                    Ok(response) => response,
                    Err(err) => {
                        error!(%err, "dispatch failed");
                        err.into()
                    }
                };
                Ok(response)
            }
            .instrument(span),
        )
    }
}
