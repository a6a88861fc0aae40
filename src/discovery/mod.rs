//! The discovery adapter contract: a background task that is handed the
//! route table and keeps it in sync with some external source of truth
//! (a JSON file, an orchestrator API, container labels).

pub mod file;
pub mod orchestrator;

#[cfg(feature = "docker")]
pub mod container;
#[cfg(feature = "docker")]
pub mod swarm;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::route::RouteTable;

/// A pluggable route-table feed. `run` is expected to perform its initial
/// full sync before returning control to the caller's spawn point, then
/// keep polling/watching until `cancel` fires.
#[async_trait]
pub trait DiscoveryAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(self: Arc<Self>, routes: Arc<RouteTable>, cancel: CancellationToken);
}

/// Splits an annotation/label value on commas and newlines, trimming
/// whitespace and dropping empty segments, into the ordered form the
/// adapters use when one unit serves several virtual hostnames.
pub fn hostnames(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostnames_splits_commas_and_newlines() {
        assert_eq!(
            hostnames("a.com, b.com\nc.com"),
            vec!["a.com".to_string(), "b.com".to_string(), "c.com".to_string()]
        );
    }
}
