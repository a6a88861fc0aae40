//! Docker container discovery: `mc-router.host`, `mc-router.port` (default
//! 25565), `mc-router.default`, and `mc-router.network` labels on running
//! containers (spec §6). Waking starts/unpauses the container; sleeping
//! stops it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{ListContainersOptions, StartContainerOptions, StopContainerOptions};
use bollard::secret::ContainerSummary;
use bollard::Docker;
use tracing::{debug, warn};

use super::DiscoveryAdapter;
use crate::route::{RouteTable, SleepError, Sleeper, WakeError, Waker};

const LABEL_HOST: &str = "mc-router.host";
const LABEL_PORT: &str = "mc-router.port";
const LABEL_DEFAULT: &str = "mc-router.default";
const LABEL_NETWORK: &str = "mc-router.network";
const DEFAULT_PORT: u16 = 25565;

pub struct ContainerDiscovery {
    docker: Docker,
    poll_interval: Duration,
    auto_scale: bool,
}

impl ContainerDiscovery {
    pub fn connect(poll_interval: Duration, auto_scale: bool) -> Result<Self, bollard::errors::Error> {
        Ok(Self {
            docker: Docker::connect_with_local_defaults()?,
            poll_interval,
            auto_scale,
        })
    }

    async fn running_containers(&self) -> Result<Vec<ContainerSummary>, bollard::errors::Error> {
        self.docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
    }

    fn endpoint_for(&self, container: &ContainerSummary, labels: &HashMap<String, String>) -> Option<String> {
        let host = labels.get(LABEL_HOST)?.clone();
        let port: u16 = labels.get(LABEL_PORT).and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_PORT);

        if let Some(network_name) = labels.get(LABEL_NETWORK) {
            if let Some(networks) = container.network_settings.as_ref().and_then(|n| n.networks.as_ref()) {
                if let Some(ip) = networks.get(network_name).and_then(|n| n.ip_address.clone()) {
                    if !ip.is_empty() {
                        return Some(format!("{ip}:{port}"));
                    }
                }
            }
        }

        Some(format!("{host}:{port}"))
    }
}

struct ContainerWaker {
    docker: Docker,
    container_id: String,
    endpoint: String,
}

#[async_trait]
impl Waker for ContainerWaker {
    async fn wake(&self) -> Result<String, WakeError> {
        let start_result = self
            .docker
            .start_container(&self.container_id, None::<StartContainerOptions<String>>)
            .await;

        if start_result.is_err() {
            self.docker
                .unpause_container(&self.container_id)
                .await
                .map_err(|e| WakeError(e.to_string()))?;
        }

        Ok(self.endpoint.clone())
    }
}

struct ContainerSleeper {
    docker: Docker,
    container_id: String,
}

#[async_trait]
impl Sleeper for ContainerSleeper {
    async fn sleep(&self) -> Result<(), SleepError> {
        self.docker
            .stop_container(&self.container_id, None::<StopContainerOptions>)
            .await
            .map_err(|e| SleepError(e.to_string()))
    }
}

#[async_trait]
impl DiscoveryAdapter for ContainerDiscovery {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn run(self: Arc<Self>, routes: Arc<RouteTable>, cancel: tokio_util::sync::CancellationToken) {
        loop {
            match self.running_containers().await {
                Ok(containers) => {
                    routes.reset();
                    routes.clear_default_route();
                    for container in &containers {
                        let Some(labels) = container.labels.clone() else { continue };
                        if !labels.contains_key(LABEL_HOST) {
                            continue;
                        }
                        let Some(container_id) = container.id.clone() else { continue };
                        let Some(endpoint) = self.endpoint_for(container, &labels) else { continue };

                        let (waker, sleeper): (Option<Arc<dyn Waker>>, Option<Arc<dyn Sleeper>>) = if self.auto_scale {
                            (
                                Some(Arc::new(ContainerWaker {
                                    docker: self.docker.clone(),
                                    container_id: container_id.clone(),
                                    endpoint: endpoint.clone(),
                                })),
                                Some(Arc::new(ContainerSleeper {
                                    docker: self.docker.clone(),
                                    container_id: container_id.clone(),
                                })),
                            )
                        } else {
                            (None, None)
                        };

                        routes.create_mapping(
                            labels.get(LABEL_HOST).unwrap(),
                            endpoint.clone(),
                            Some(container_id.clone()),
                            waker.clone(),
                            sleeper.clone(),
                            None,
                        );

                        if labels.get(LABEL_DEFAULT).map(|v| v == "true").unwrap_or(false) {
                            routes.set_default_route(endpoint, Some(container_id), waker, sleeper, None);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "docker container listing failed"),
            }

            debug!("docker discovery sync complete");

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
