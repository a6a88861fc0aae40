//! The route table: a concurrent map from normalized virtual hostname to
//! backend endpoint, plus the waker/sleeper hooks a discovery adapter can
//! attach for scale-to-zero backends.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

/// Wakes a scaled-down backend up to one replica. Returns the backend
/// endpoint to dial, which may differ from the statically configured one
/// (e.g. a freshly assigned pod IP).
#[async_trait]
pub trait Waker: Send + Sync {
    async fn wake(&self) -> Result<String, WakeError>;
}

/// Scales a backend down to zero replicas once idle.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self) -> Result<(), SleepError>;
}

#[derive(Debug, thiserror::Error)]
#[error("wakeup failed: {0}")]
pub struct WakeError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("sleep failed: {0}")]
pub struct SleepError(pub String);

#[derive(Clone)]
pub struct RouteEntry {
    pub backend: String,
    pub scale_key: Option<String>,
    pub waker: Option<Arc<dyn Waker>>,
    pub sleeper: Option<Arc<dyn Sleeper>>,
    pub asleep_motd: Option<String>,
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("backend", &self.backend)
            .field("scale_key", &self.scale_key)
            .field("has_waker", &self.waker.is_some())
            .field("has_sleeper", &self.sleeper.is_some())
            .field("asleep_motd", &self.asleep_motd)
            .finish()
    }
}

impl RouteEntry {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            scale_key: None,
            waker: None,
            sleeper: None,
            asleep_motd: None,
        }
    }

    /// The identifier the down-scaler uses to pick sleepers. Defaults to
    /// the backend endpoint when no separate scale key was configured.
    pub fn scale_key(&self) -> &str {
        self.scale_key.as_deref().unwrap_or(&self.backend)
    }
}

/// A lookup result: the resolved backend entry (or the default route) plus
/// the normalized hostname that was actually looked up.
#[derive(Clone)]
pub struct Resolved {
    pub backend: String,
    pub normalized_address: String,
    pub scale_key: Option<String>,
    pub waker: Option<Arc<dyn Waker>>,
    pub sleeper: Option<Arc<dyn Sleeper>>,
    pub asleep_motd: Option<String>,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("backend", &self.backend)
            .field("normalized_address", &self.normalized_address)
            .field("scale_key", &self.scale_key)
            .field("has_waker", &self.waker.is_some())
            .field("has_sleeper", &self.sleeper.is_some())
            .field("asleep_motd", &self.asleep_motd)
            .finish()
    }
}

struct Inner {
    mappings: HashMap<String, RouteEntry>,
    default_route: Option<RouteEntry>,
    simplify_srv: bool,
}

pub struct RouteTable {
    inner: RwLock<Inner>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                mappings: HashMap::new(),
                default_route: None,
                simplify_srv: false,
            }),
        }
    }

    /// Normalizes a requested hostname before lookup or storage:
    /// strip a trailing DNS-root dot, optionally strip a leading
    /// `_minecraft._tcp.` SRV prefix, truncate at the first NUL byte
    /// (Forge suffix), then lowercase.
    pub fn normalize(&self, server_address: &str) -> String {
        let mut addr = server_address.trim_end_matches('.');

        if self.inner.read().simplify_srv {
            const SRV_PREFIX: &str = "_minecraft._tcp.";
            if let Some(stripped) = addr.strip_prefix(SRV_PREFIX) {
                addr = stripped;
            }
        }

        let addr = match addr.find('\0') {
            Some(idx) => &addr[..idx],
            None => addr,
        };

        addr.to_lowercase()
    }

    pub fn create_mapping(
        &self,
        server_address: &str,
        backend: impl Into<String>,
        scale_key: Option<String>,
        waker: Option<Arc<dyn Waker>>,
        sleeper: Option<Arc<dyn Sleeper>>,
        asleep_motd: Option<String>,
    ) {
        let key = self.normalize(server_address);
        let entry = RouteEntry {
            backend: backend.into(),
            scale_key,
            waker,
            sleeper,
            asleep_motd,
        };
        self.inner.write().mappings.insert(key, entry);
    }

    pub fn set_default_route(
        &self,
        backend: impl Into<String>,
        scale_key: Option<String>,
        waker: Option<Arc<dyn Waker>>,
        sleeper: Option<Arc<dyn Sleeper>>,
        asleep_motd: Option<String>,
    ) {
        let entry = RouteEntry {
            backend: backend.into(),
            scale_key,
            waker,
            sleeper,
            asleep_motd,
        };
        self.inner.write().default_route = Some(entry);
    }

    /// Returns whether a mapping existed before removal.
    pub fn delete_mapping(&self, server_address: &str) -> bool {
        let key = self.normalize(server_address);
        self.inner.write().mappings.remove(&key).is_some()
    }

    pub fn clear_default_route(&self) {
        self.inner.write().default_route = None;
    }

    /// Looks a normalized hostname up, falling back to the default route
    /// when no mapping matches.
    pub fn find(&self, server_address: &str) -> Option<Resolved> {
        let normalized = self.normalize(server_address);
        let guard = self.inner.read();

        let entry = guard.mappings.get(&normalized).or(guard.default_route.as_ref())?;

        Some(Resolved {
            backend: entry.backend.clone(),
            normalized_address: normalized,
            scale_key: Some(entry.scale_key().to_string()),
            waker: entry.waker.clone(),
            sleeper: entry.sleeper.clone(),
            asleep_motd: entry.asleep_motd.clone(),
        })
    }

    pub fn get_mappings(&self) -> HashMap<String, String> {
        self.inner
            .read()
            .mappings
            .iter()
            .map(|(k, v)| (k.clone(), v.backend.clone()))
            .collect()
    }

    /// All sleepers whose entry's scale key matches `scale_key`, across both
    /// the mapping table and the default route.
    pub fn get_sleepers(&self, scale_key: &str) -> Vec<Arc<dyn Sleeper>> {
        let guard = self.inner.read();
        guard
            .mappings
            .values()
            .chain(guard.default_route.iter())
            .filter(|entry| entry.scale_key() == scale_key)
            .filter_map(|entry| entry.sleeper.clone())
            .collect()
    }

    pub fn simplify_srv(&self, enabled: bool) {
        self.inner.write().simplify_srv = enabled;
    }

    /// Drops every mapping; the default route is left untouched.
    pub fn reset(&self) {
        self.inner.write().mappings.clear();
    }
}
