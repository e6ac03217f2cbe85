// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use std::sync::Arc;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(%err, "failed to encode metrics");
        }
        buffer
    }
}

pub struct MetricsCollector {
    requests_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    failovers_total: IntCounterVec,
    backend_up: IntGaugeVec,
    pool_size: IntGauge,
    exhausted_total: IntCounter,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("lb_requests_total", "Completed requests by backend"),
            &["backend", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lb_request_duration_seconds",
                "End-to-end request duration in seconds",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let failovers_total = IntCounterVec::new(
            Opts::new(
                "lb_failovers_total",
                "Delivery failures that triggered failover",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(failovers_total.clone()))?;

        let backend_up = IntGaugeVec::new(
            Opts::new("lb_backend_up", "Backend liveness (1=up, 0=down)"),
            &["backend"],
        )?;
        registry.register(Box::new(backend_up.clone()))?;

        let pool_size = IntGauge::new("lb_pool_size", "Registered backends")?;
        registry.register(Box::new(pool_size.clone()))?;

        let exhausted_total = IntCounter::new(
            "lb_exhausted_total",
            "Requests that failed against every backend",
        )?;
        registry.register(Box::new(exhausted_total.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            failovers_total,
            backend_up,
            pool_size,
            exhausted_total,
        })
    }

    pub fn record_request(&self, backend: &str, status_code: u16, duration: std::time::Duration) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[backend, &status])
            .inc();

        self.request_duration_seconds
            .with_label_values(&[backend])
            .observe(duration.as_secs_f64());
    }

    pub fn record_failover(&self, backend: &str) {
        self.failovers_total.with_label_values(&[backend]).inc();
    }

    pub fn record_exhausted(&self) {
        self.exhausted_total.inc();
    }

    pub fn set_backend_up(&self, backend: &str, up: bool) {
        self.backend_up
            .with_label_values(&[backend])
            .set(if up { 1 } else { 0 });
    }

    pub fn set_pool_size(&self, size: usize) {
        self.pool_size.set(size as i64);
    }
}
