//! Polls a generic orchestrator's service-listing API for Minecraft
//! backends, keyed by the `mc-router.itzg.me/*` annotations (spec §6).
//! Grounded on the same poll-and-diff shape as the file adapter, with
//! scaling delegated to the orchestrator through two HTTP calls.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{hostnames, DiscoveryAdapter};
use crate::route::{RouteTable, SleepError, Sleeper, WakeError, Waker};

const EXTERNAL_SERVER_NAME: &str = "mc-router.itzg.me/externalServerName";
const DEFAULT_SERVER: &str = "mc-router.itzg.me/defaultServer";
const PROXY_SERVER_NAME: &str = "mc-router.itzg.me/proxyServerName";

#[derive(Debug, Clone, Deserialize)]
struct ServiceRecord {
    /// The orchestrator's identifier for the backing controller; also the
    /// scale key, independent of whichever endpoint traffic is routed to.
    name: String,
    /// The service's own endpoint, used as the backend unless
    /// `proxy_server_name` overrides it.
    endpoint: String,
    #[serde(default)]
    annotations: HashMap<String, String>,
}

pub struct OrchestratorDiscovery {
    base_url: String,
    poll_interval: Duration,
    auto_scale: bool,
    client: reqwest::Client,
}

impl OrchestratorDiscovery {
    pub fn new(base_url: impl Into<String>, poll_interval: Duration, auto_scale: bool) -> Self {
        Self {
            base_url: base_url.into(),
            poll_interval,
            auto_scale,
            client: reqwest::Client::new(),
        }
    }

    async fn list_services(&self) -> Result<Vec<ServiceRecord>, reqwest::Error> {
        self.client
            .get(format!("{}/services", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    fn apply(&self, routes: &RouteTable, services: &[ServiceRecord], previously_seen: &HashSet<String>) {
        let mut seen_hostnames = HashSet::new();
        let mut default_set = false;

        for service in services {
            let Some(annotated) = service.annotations.get(EXTERNAL_SERVER_NAME) else {
                continue;
            };

            let backend = service
                .annotations
                .get(PROXY_SERVER_NAME)
                .cloned()
                .unwrap_or_else(|| service.endpoint.clone());

            let (waker, sleeper): (Option<Arc<dyn Waker>>, Option<Arc<dyn Sleeper>>) = if self.auto_scale {
                (
                    Some(Arc::new(OrchestratorWaker {
                        client: self.client.clone(),
                        base_url: self.base_url.clone(),
                        service_name: service.name.clone(),
                    })),
                    Some(Arc::new(OrchestratorSleeper {
                        client: self.client.clone(),
                        base_url: self.base_url.clone(),
                        service_name: service.name.clone(),
                    })),
                )
            } else {
                (None, None)
            };

            for hostname in hostnames(annotated) {
                seen_hostnames.insert(hostname.clone());
                routes.create_mapping(
                    &hostname,
                    backend.clone(),
                    Some(service.name.clone()),
                    waker.clone(),
                    sleeper.clone(),
                    None,
                );
            }

            if service.annotations.get(DEFAULT_SERVER).map(|v| v == "true").unwrap_or(false) {
                routes.set_default_route(backend.clone(), Some(service.name.clone()), waker, sleeper, None);
                default_set = true;
            }
        }

        if !default_set {
            routes.clear_default_route();
        }

        for stale in previously_seen.difference(&seen_hostnames) {
            routes.delete_mapping(stale);
        }
    }
}

struct OrchestratorWaker {
    client: reqwest::Client,
    base_url: String,
    service_name: String,
}

#[async_trait]
impl Waker for OrchestratorWaker {
    async fn wake(&self) -> Result<String, WakeError> {
        scale(&self.client, &self.base_url, &self.service_name, 1)
            .await
            .map_err(|e| WakeError(e.to_string()))
    }
}

struct OrchestratorSleeper {
    client: reqwest::Client,
    base_url: String,
    service_name: String,
}

#[async_trait]
impl Sleeper for OrchestratorSleeper {
    async fn sleep(&self) -> Result<(), SleepError> {
        scale(&self.client, &self.base_url, &self.service_name, 0)
            .await
            .map(|_| ())
            .map_err(|e| SleepError(e.to_string()))
    }
}

#[derive(Deserialize)]
struct ScaleResponse {
    endpoint: String,
}

/// Sets a service's replica count via the orchestrator API, returning the
/// endpoint to dial once it reports ready (waking) or the prior value
/// (sleeping, where the response is discarded by the caller).
async fn scale(
    client: &reqwest::Client,
    base_url: &str,
    service_name: &str,
    replicas: u32,
) -> Result<String, reqwest::Error> {
    let response: ScaleResponse = client
        .post(format!("{base_url}/services/{service_name}/scale"))
        .json(&serde_json::json!({ "replicas": replicas }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(response.endpoint)
}

#[async_trait]
impl DiscoveryAdapter for OrchestratorDiscovery {
    fn name(&self) -> &'static str {
        "orchestrator"
    }

    async fn run(self: Arc<Self>, routes: Arc<RouteTable>, cancel: tokio_util::sync::CancellationToken) {
        let mut known_hostnames = HashSet::new();

        loop {
            match self.list_services().await {
                Ok(services) => {
                    self.apply(&routes, &services, &known_hostnames);
                    known_hostnames = services
                        .iter()
                        .flat_map(|s| s.annotations.get(EXTERNAL_SERVER_NAME))
                        .flat_map(|v| hostnames(v))
                        .collect();
                }
                Err(e) => warn!(error = %e, "orchestrator poll failed"),
            }

            debug!(services = known_hostnames.len(), "orchestrator sync complete");

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
