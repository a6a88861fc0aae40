//! Docker Swarm service discovery: the service-level counterpart to
//! [`super::container`], keyed on the same `mc-router.*` labels but read
//! from swarm service specs instead of container labels, and scaled by
//! updating the service's replica count instead of start/stop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::secret::{ServiceSpec, ServiceSpecMode, ServiceSpecModeReplicated};
use bollard::service::{ListServicesOptions, UpdateServiceOptions};
use bollard::Docker;
use tracing::{debug, warn};

use super::DiscoveryAdapter;
use crate::route::{RouteTable, SleepError, Sleeper, WakeError, Waker};

const LABEL_HOST: &str = "mc-router.host";
const LABEL_PORT: &str = "mc-router.port";
const LABEL_DEFAULT: &str = "mc-router.default";
const DEFAULT_PORT: u16 = 25565;

pub struct SwarmDiscovery {
    docker: Docker,
    poll_interval: Duration,
    auto_scale: bool,
}

impl SwarmDiscovery {
    pub fn connect(poll_interval: Duration, auto_scale: bool) -> Result<Self, bollard::errors::Error> {
        Ok(Self {
            docker: Docker::connect_with_local_defaults()?,
            poll_interval,
            auto_scale,
        })
    }

    fn labels_of(spec: &ServiceSpec) -> HashMap<String, String> {
        spec.labels.clone().unwrap_or_default()
    }
}

struct SwarmWaker {
    docker: Docker,
    service_id: String,
    endpoint: String,
}

#[async_trait]
impl Waker for SwarmWaker {
    async fn wake(&self) -> Result<String, WakeError> {
        set_replicas(&self.docker, &self.service_id, 1)
            .await
            .map_err(|e| WakeError(e.to_string()))?;
        Ok(self.endpoint.clone())
    }
}

struct SwarmSleeper {
    docker: Docker,
    service_id: String,
}

#[async_trait]
impl Sleeper for SwarmSleeper {
    async fn sleep(&self) -> Result<(), SleepError> {
        set_replicas(&self.docker, &self.service_id, 0)
            .await
            .map_err(|e| SleepError(e.to_string()))
    }
}

async fn set_replicas(docker: &Docker, service_id: &str, replicas: u64) -> Result<(), bollard::errors::Error> {
    let current = docker.inspect_service(service_id, None).await?;
    let mut spec = current.spec.unwrap_or_default();
    spec.mode = Some(ServiceSpecMode {
        replicated: Some(ServiceSpecModeReplicated { replicas: Some(replicas as i64) }),
        ..Default::default()
    });

    docker
        .update_service(
            service_id,
            spec,
            UpdateServiceOptions {
                version: current.version.and_then(|v| v.index).unwrap_or_default(),
                ..Default::default()
            },
            None,
        )
        .await?;
    Ok(())
}

#[async_trait]
impl DiscoveryAdapter for SwarmDiscovery {
    fn name(&self) -> &'static str {
        "swarm"
    }

    async fn run(self: Arc<Self>, routes: Arc<RouteTable>, cancel: tokio_util::sync::CancellationToken) {
        loop {
            match self
                .docker
                .list_services(None::<ListServicesOptions<String>>)
                .await
            {
                Ok(services) => {
                    routes.reset();
                    routes.clear_default_route();
                    for service in &services {
                        let Some(spec) = service.spec.as_ref() else { continue };
                        let labels = Self::labels_of(spec);
                        let Some(host) = labels.get(LABEL_HOST) else { continue };
                        let Some(service_id) = service.id.clone() else { continue };
                        let port: u16 = labels.get(LABEL_PORT).and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_PORT);
                        let backend = format!("{host}:{port}");

                        let (waker, sleeper): (Option<Arc<dyn Waker>>, Option<Arc<dyn Sleeper>>) = if self.auto_scale {
                            (
                                Some(Arc::new(SwarmWaker {
                                    docker: self.docker.clone(),
                                    service_id: service_id.clone(),
                                    endpoint: backend.clone(),
                                })),
                                Some(Arc::new(SwarmSleeper {
                                    docker: self.docker.clone(),
                                    service_id: service_id.clone(),
                                })),
                            )
                        } else {
                            (None, None)
                        };

                        routes.create_mapping(host, backend.clone(), Some(service_id.clone()), waker.clone(), sleeper.clone(), None);

                        if labels.get(LABEL_DEFAULT).map(|v| v == "true").unwrap_or(false) {
                            routes.set_default_route(backend, Some(service_id), waker, sleeper, None);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "swarm service listing failed"),
            }

            debug!("swarm discovery sync complete");

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
