//! Per-backend and total active-connection accounting. Decrements below
//! zero are clamped rather than panicking or wrapping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
pub struct ActiveConnections {
    per_backend: Mutex<HashMap<String, u64>>,
    total: AtomicI64,
    drained: Notify,
}

impl ActiveConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, backend: &str) {
        let mut map = self.per_backend.lock();
        *map.entry(backend.to_string()).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrements the count for `backend`, returning the count remaining
    /// for that backend after the decrement.
    pub fn decrement(&self, backend: &str) -> u64 {
        let mut map = self.per_backend.lock();
        let remaining = match map.get_mut(backend) {
            Some(count) if *count > 0 => {
                *count -= 1;
                *count
            }
            _ => 0,
        };

        let previous_total = self.total.fetch_sub(1, Ordering::SeqCst);
        if previous_total <= 1 {
            // Clamp: never let the visible total go negative, and wake
            // anyone waiting for a fully drained proxy.
            self.total.store(0, Ordering::SeqCst);
            self.drained.notify_waiters();
        }

        remaining
    }

    pub fn total(&self) -> i64 {
        self.total.load(Ordering::SeqCst).max(0)
    }

    pub fn count_for(&self, backend: &str) -> u64 {
        self.per_backend.lock().get(backend).copied().unwrap_or(0)
    }

    /// Blocks until the total active-connection count reaches zero. Used
    /// for graceful shutdown.
    pub async fn wait_for_drain(&self) {
        loop {
            if self.total() == 0 {
                return;
            }
            self.drained.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn never_goes_negative_under_interleaved_decrements() {
        let active = ActiveConnections::new();
        active.increment("b:1");
        assert_eq!(active.decrement("b:1"), 0);
        assert_eq!(active.decrement("b:1"), 0); // extra decrement is clamped
        assert_eq!(active.total(), 0);
    }

    #[tokio::test]
    async fn wait_for_drain_resolves_once_empty() {
        let active = Arc::new(ActiveConnections::new());
        active.increment("b:1");

        let waiter = {
            let active = active.clone();
            tokio::spawn(async move {
                active.wait_for_drain().await;
            })
        };

        tokio::task::yield_now().await;
        active.decrement("b:1");

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("drain wait should resolve")
            .unwrap();
    }
}
