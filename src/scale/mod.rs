//! Per-backend cancelable delayed sleeper invocation (spec §4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::route::RouteTable;

pub struct DownScaler {
    enabled: bool,
    delay: Duration,
    routes: Arc<RouteTable>,
    pending: Mutex<HashMap<String, CancellationToken>>,
    parent: CancellationToken,
}

impl DownScaler {
    pub fn new(routes: Arc<RouteTable>, enabled: bool, delay: Duration, parent: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            enabled,
            delay,
            routes,
            pending: Mutex::new(HashMap::new()),
            parent,
        })
    }

    /// Cancels any existing pending timer for `scale_key`, then starts a new
    /// one. A no-op when the down-scaler is disabled.
    pub fn begin(self: &Arc<Self>, scale_key: &str) {
        if !self.enabled {
            return;
        }

        self.cancel(scale_key);

        let token = self.parent.child_token();
        self.pending.lock().insert(scale_key.to_string(), token.clone());

        let this = self.clone();
        let key = scale_key.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(this.delay) => {
                    this.pending.lock().remove(&key);
                    this.fire(&key).await;
                }
                _ = token.cancelled() => {
                    debug!(scale_key = %key, "down-scale timer cancelled");
                }
            }
        });
    }

    /// Cancels and removes the pending timer for `scale_key`, if any. A
    /// `cancel` after the timer already fired has no effect on the
    /// dispatched sleeper, which runs to completion under the parent scope.
    pub fn cancel(&self, scale_key: &str) {
        if !self.enabled {
            return;
        }
        if let Some(token) = self.pending.lock().remove(scale_key) {
            token.cancel();
        }
    }

    pub fn reset(&self) {
        let mut pending = self.pending.lock();
        for (_, token) in pending.drain() {
            token.cancel();
        }
    }

    async fn fire(self: &Arc<Self>, scale_key: &str) {
        let sleepers = self.routes.get_sleepers(scale_key);
        if sleepers.is_empty() {
            return;
        }

        for sleeper in sleepers {
            let key = scale_key.to_string();
            tokio::spawn(async move {
                if let Err(e) = sleeper.sleep().await {
                    warn!(scale_key = %key, error = %e, "sleeper invocation failed");
                }
            });
        }
    }
}
