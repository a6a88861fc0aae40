//! A reverse proxy for the Minecraft Java Edition protocol. Multiplexes
//! many backend servers behind one public listener, routes by the
//! handshake's virtual host, optionally wakes a sleeping backend before
//! dialing it, and relays bytes verbatim.

pub mod cli;
pub mod config;
pub mod connector;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod protocol;
pub mod route;
pub mod scale;
pub mod security;
pub mod telemetry;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::ShutdownController;
use crate::config::{MetricsBackend, RouterConfig};
use crate::connector::{Connector, ProxyProtocolConfig};
use crate::discovery::file::FileDiscovery;
use crate::discovery::orchestrator::OrchestratorDiscovery;
use crate::discovery::DiscoveryAdapter;
use crate::metrics::{noop, InMemoryMetrics, MetricsSink};
use crate::notifier::{NoopNotifier, Notifier, WebhookNotifier};
use crate::route::RouteTable;
use crate::scale::DownScaler;
use crate::security::filter::ClientFilter;
use crate::security::rate_limiter::RateLimiter;

/// The assembled, running proxy: owns the route table, the connector, and
/// every background task (discovery adapters, signal handlers) spun up
/// from a [`RouterConfig`].
pub struct Router {
    config: RouterConfig,
    routes: Arc<RouteTable>,
    connector: Arc<Connector>,
    shutdown: Arc<ShutdownController>,
    discovery_adapters: Vec<Arc<dyn DiscoveryAdapter>>,
}

impl Router {
    pub fn new(config: RouterConfig, shutdown: Arc<ShutdownController>) -> Result<Self, crate::security::filter::FilterConfigError> {
        let routes = Arc::new(RouteTable::new());

        let filter = Arc::new(ClientFilter::from_config(&config.client_filter)?);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_per_second));
        let allow_deny = Arc::new(config.auto_scale_allow_deny.clone());
        let downscaler = DownScaler::new(
            routes.clone(),
            config.down_scaler_enabled,
            config.down_scaler_delay,
            shutdown.token(),
        );

        let notifier: Arc<dyn Notifier> = match &config.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
            None => Arc::new(NoopNotifier),
        };

        let metrics: Arc<dyn MetricsSink> = match config.metrics_backend {
            MetricsBackend::None => noop(),
            // No standalone Prometheus exporter is wired up; both non-`none`
            // backends get the same in-process counters until one is added.
            MetricsBackend::Expvar | MetricsBackend::Prometheus => Arc::new(InMemoryMetrics::default()),
        };

        let proxy_protocol = ProxyProtocolConfig {
            send_enabled: config.proxy_protocol_send,
            receive_enabled: config.proxy_protocol_receive,
            trusted_cidrs: config.proxy_protocol_trusted_cidrs.clone(),
        };

        let connector = Connector::new(
            routes.clone(),
            filter,
            rate_limiter,
            allow_deny,
            downscaler,
            notifier,
            metrics,
            proxy_protocol,
            shutdown.token(),
        );

        let mut discovery_adapters: Vec<Arc<dyn DiscoveryAdapter>> = Vec::new();
        if let Some(path) = &config.routes_file {
            discovery_adapters.push(Arc::new(FileDiscovery::new(path.clone())));
        }
        if let Some(base_url) = orchestrator_base_url() {
            discovery_adapters.push(Arc::new(OrchestratorDiscovery::new(
                base_url,
                std::time::Duration::from_secs(10),
                config.down_scaler_enabled,
            )));
        }

        #[cfg(feature = "docker")]
        if config.docker_discovery {
            match crate::discovery::container::ContainerDiscovery::connect(
                std::time::Duration::from_secs(10),
                config.down_scaler_enabled,
            ) {
                Ok(adapter) => discovery_adapters.push(Arc::new(adapter)),
                Err(e) => warn!(error = %e, "failed to connect to Docker, container discovery disabled"),
            }
        }

        #[cfg(feature = "docker")]
        if config.docker_swarm_discovery {
            match crate::discovery::swarm::SwarmDiscovery::connect(
                std::time::Duration::from_secs(10),
                config.down_scaler_enabled,
            ) {
                Ok(adapter) => discovery_adapters.push(Arc::new(adapter)),
                Err(e) => warn!(error = %e, "failed to connect to Docker, swarm discovery disabled"),
            }
        }

        Ok(Self {
            config,
            routes,
            connector,
            shutdown,
            discovery_adapters,
        })
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// Binds the listener and spawns every discovery adapter's background
    /// task. Returns once the listener is bound; everything else runs until
    /// the shutdown token fires.
    pub async fn run(self: &Arc<Self>) -> std::io::Result<()> {
        for adapter in &self.discovery_adapters {
            let adapter = adapter.clone();
            let routes = self.routes.clone();
            let cancel = self.shutdown.token();
            let name = adapter.name();
            info!(adapter = name, "starting discovery adapter");
            tokio::spawn(async move { adapter.run(routes, cancel).await });
        }

        self.connector.start(&self.config.bind.to_string()).await?;

        let reload_routes = self.routes.clone();
        let reload_path = self.config.routes_file.clone();
        self.shutdown.spawn_signal_handlers(move || {
            let Some(path) = reload_path.clone() else { return };
            let routes = reload_routes.clone();
            tokio::spawn(async move {
                let discovery = FileDiscovery::new(path);
                if let Err(e) = discovery.reload_into(&routes) {
                    warn!(error = %e, "SIGHUP route reload failed");
                }
            });
        });

        Ok(())
    }

    /// Waits for every in-flight connection to drain, for use after the
    /// shutdown token has already been cancelled.
    pub async fn wait_for_connections(&self) {
        self.connector.wait_for_connections().await;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.token()
    }
}

fn orchestrator_base_url() -> Option<String> {
    std::env::var("MC_ROUTER_ORCHESTRATOR_URL").ok()
}
