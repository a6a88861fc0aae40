//! Startup configuration: a YAML file on disk, overridable by CLI flags and
//! environment variables, merged into a single [`RouterConfig`].

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use ipnetwork::IpNetwork;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::security::allowdeny::AllowDenyConfig;
use crate::security::filter::ClientFilterConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: serde_yaml::Error },
    #[error("invalid CIDR {value}: {source}")]
    InvalidCidr { value: String, source: ipnetwork::IpNetworkError },
    #[error("invalid bind address {value}: {source}")]
    InvalidBind { value: String, source: std::net::AddrParseError },
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProxyProtocolFile {
    #[serde(default)]
    pub send: bool,
    #[serde(default)]
    pub receive: bool,
    #[serde(default)]
    pub trusted_cidrs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DownScalerFile {
    #[serde(default)]
    pub enabled: bool,
    #[serde(with = "humantime_serde", default = "default_downscale_delay")]
    pub delay: Duration,
}

fn default_downscale_delay() -> Duration {
    Duration::from_secs(5 * 60)
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetricsBackend {
    #[default]
    None,
    Expvar,
    Prometheus,
}

/// The on-disk shape of the config file. All fields are optional so a CLI
/// flag or environment variable can supply what the file omits.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    pub bind: Option<String>,
    pub rate_limit_per_second: Option<u32>,
    #[serde(default)]
    pub client_filter: ClientFilterConfig,
    #[serde(default)]
    pub proxy_protocol: ProxyProtocolFile,
    #[serde(default)]
    pub down_scaler: DownScalerFile,
    #[serde(default)]
    pub auto_scale_allow_deny: AllowDenyConfig,
    pub routes_file: Option<String>,
    #[serde(default)]
    pub metrics_backend: MetricsBackend,
    pub webhook_url: Option<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// CLI flags, each overriding the matching config-file field when present.
#[derive(Debug, Parser)]
#[command(name = "mc-router", about = "Reverse proxy for Minecraft Java Edition")]
pub struct Args {
    #[arg(long, short = 'c', env = "MC_ROUTER_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "MC_ROUTER_BIND")]
    pub bind: Option<String>,

    #[arg(long, env = "MC_ROUTER_RATE_LIMIT")]
    pub rate_limit_per_second: Option<u32>,

    #[arg(long, env = "MC_ROUTER_ROUTES_FILE")]
    pub routes_file: Option<String>,

    #[arg(long, env = "MC_ROUTER_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    #[arg(long, env = "MC_ROUTER_DOCKER")]
    pub docker: bool,

    #[arg(long, env = "MC_ROUTER_DOCKER_SWARM")]
    pub docker_swarm: bool,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub bind: SocketAddr,
    pub rate_limit_per_second: u32,
    pub client_filter: ClientFilterConfig,
    pub proxy_protocol_send: bool,
    pub proxy_protocol_receive: bool,
    pub proxy_protocol_trusted_cidrs: Vec<IpNetwork>,
    pub down_scaler_enabled: bool,
    pub down_scaler_delay: Duration,
    pub auto_scale_allow_deny: AllowDenyConfig,
    pub routes_file: Option<PathBuf>,
    pub metrics_backend: MetricsBackend,
    pub webhook_url: Option<String>,
    pub docker_discovery: bool,
    pub docker_swarm_discovery: bool,
}

const DEFAULT_BIND: &str = "0.0.0.0:25565";
const DEFAULT_RATE_LIMIT: u32 = 100;

impl RouterConfig {
    pub fn build(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => {
                debug!(path = %path.display(), "loading config file");
                ConfigFile::load(path)?
            }
            None => ConfigFile::default(),
        };

        let bind_str = args
            .bind
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_str.parse().map_err(|source| ConfigError::InvalidBind {
            value: bind_str,
            source,
        })?;

        let proxy_protocol_trusted_cidrs = parse_cidrs(&file.proxy_protocol.trusted_cidrs)?;

        Ok(Self {
            bind,
            rate_limit_per_second: args
                .rate_limit_per_second
                .or(file.rate_limit_per_second)
                .unwrap_or(DEFAULT_RATE_LIMIT),
            client_filter: file.client_filter,
            proxy_protocol_send: file.proxy_protocol.send,
            proxy_protocol_receive: file.proxy_protocol.receive,
            proxy_protocol_trusted_cidrs,
            down_scaler_enabled: file.down_scaler.enabled,
            down_scaler_delay: file.down_scaler.delay,
            auto_scale_allow_deny: file.auto_scale_allow_deny,
            routes_file: args.routes_file.or(file.routes_file).map(PathBuf::from),
            metrics_backend: file.metrics_backend,
            webhook_url: args.webhook_url.or(file.webhook_url),
            docker_discovery: args.docker,
            docker_swarm_discovery: args.docker_swarm,
        })
    }
}

fn parse_cidrs(values: &[String]) -> Result<Vec<IpNetwork>, ConfigError> {
    values
        .iter()
        .map(|v| {
            v.parse().map_err(|source| ConfigError::InvalidCidr {
                value: v.clone(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "bind: '0.0.0.0:1'\nrate_limit_per_second: 5\n").unwrap();

        let args = Args {
            config: Some(path),
            bind: Some("0.0.0.0:2".to_string()),
            rate_limit_per_second: None,
            routes_file: None,
            webhook_url: None,
            docker: false,
            docker_swarm: false,
        };

        let config = RouterConfig::build(args).unwrap();
        assert_eq!(config.bind.port(), 2);
        assert_eq!(config.rate_limit_per_second, 5);
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let args = Args {
            config: None,
            bind: None,
            rate_limit_per_second: None,
            routes_file: None,
            webhook_url: None,
            docker: false,
            docker_swarm: false,
        };

        let config = RouterConfig::build(args).unwrap();
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.rate_limit_per_second, DEFAULT_RATE_LIMIT);
    }

    #[test]
    fn invalid_cidr_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "proxy_protocol:\n  trusted_cidrs: ['not-a-cidr']\n").unwrap();

        let args = Args {
            config: Some(path),
            bind: None,
            rate_limit_per_second: None,
            routes_file: None,
            webhook_url: None,
            docker: false,
            docker_swarm: false,
        };

        assert!(matches!(RouterConfig::build(args), Err(ConfigError::InvalidCidr { .. })));
    }
}
