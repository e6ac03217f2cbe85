// src/proxy/pool.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::backend::Backend;
use super::error::ProxyError;

/// Ordered backend set plus the round-robin rotation cursor.
///
/// Backends keep registration order; the cursor is a monotonically increasing
/// counter taken modulo the pool length on each selection. `add` and `next`
/// are the only mutation paths and both are safe under concurrent callers.
/// Duplicate addresses are allowed and produce independent entries.
pub struct BackendPool {
    backends: RwLock<Vec<Arc<Backend>>>,
    cursor: AtomicUsize,
}

impl BackendPool {
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    pub async fn add(&self, backend: Arc<Backend>) {
        let mut backends = self.backends.write().await;
        backends.push(backend);
    }

    /// Select the backend at `cursor % len` and advance the cursor.
    ///
    /// The single `fetch_add` makes concurrent callers observe distinct
    /// cursor values, so a burst of len() concurrent selections visits every
    /// backend exactly once. An empty pool fails without touching the cursor.
    pub async fn next(&self) -> Result<Arc<Backend>, ProxyError> {
        let backends = self.backends.read().await;
        if backends.is_empty() {
            return Err(ProxyError::NoBackends);
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % backends.len();
        Ok(backends[index].clone())
    }

    pub async fn len(&self) -> usize {
        self.backends.read().await.len()
    }

    pub async fn snapshot(&self) -> Vec<Arc<Backend>> {
        self.backends.read().await.clone()
    }
}

impl Default for BackendPool {
    fn default() -> Self {
        Self::new()
    }
}
