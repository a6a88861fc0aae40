//! The narrow metrics-sink contract the core assumes. Selecting an actual
//! backend (Prometheus, expvar, InfluxDB) is an external concern; this
//! crate only ships a no-op sink so the core runs without one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &'static str, server: &str);
    fn add_bytes(&self, direction: &'static str, server: &str, bytes: u64);
    fn set_active_connections(&self, server: &str, count: i64);
}

#[derive(Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr_counter(&self, _name: &'static str, _server: &str) {}
    fn add_bytes(&self, _direction: &'static str, _server: &str, _bytes: u64) {}
    fn set_active_connections(&self, _server: &str, _count: i64) {}
}

/// An in-process counting sink useful for tests and for the `expvar`-style
/// deployment that just needs process-wide totals, no per-label breakdown.
#[derive(Default)]
pub struct InMemoryMetrics {
    pub bytes_transferred: AtomicU64,
    pub errors: AtomicU64,
}

impl MetricsSink for InMemoryMetrics {
    fn incr_counter(&self, _name: &'static str, _server: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn add_bytes(&self, _direction: &'static str, _server: &str, bytes: u64) {
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    fn set_active_connections(&self, _server: &str, _count: i64) {}
}

pub fn noop() -> Arc<dyn MetricsSink> {
    Arc::new(NoopMetrics)
}
