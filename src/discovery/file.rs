//! JSON route-file loader: `{"default-server": "host:port", "mappings":
//! {"hostname": "host:port", ...}}`, reloaded on file-change with a debounce
//! so a multi-write save doesn't trigger a reload per write.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notify::{RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::DiscoveryAdapter;
use crate::route::RouteTable;

const DEBOUNCE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize, Default)]
struct RouteFile {
    #[serde(rename = "default-server")]
    default_server: Option<String>,
    #[serde(default)]
    mappings: std::collections::HashMap<String, String>,
}

pub struct FileDiscovery {
    path: PathBuf,
}

impl FileDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> std::io::Result<RouteFile> {
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Loads and applies the route file once, synchronously. Used for the
    /// SIGHUP-triggered reload, which happens outside the adapter's own
    /// watch loop.
    pub fn reload_into(&self, routes: &RouteTable) -> std::io::Result<()> {
        let file = self.load()?;
        self.apply(routes, file);
        Ok(())
    }

    fn apply(&self, routes: &RouteTable, file: RouteFile) {
        routes.reset();
        for (hostname, backend) in file.mappings {
            routes.create_mapping(&hostname, backend, None, None, None, None);
        }
        match file.default_server {
            Some(backend) => routes.set_default_route(backend, None, None, None, None),
            None => routes.clear_default_route(),
        }
    }
}

#[async_trait]
impl DiscoveryAdapter for FileDiscovery {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn run(self: Arc<Self>, routes: Arc<RouteTable>, cancel: tokio_util::sync::CancellationToken) {
        match self.load() {
            Ok(file) => self.apply(&routes, file),
            Err(e) => warn!(path = %self.path.display(), error = %e, "initial route file load failed"),
        }

        let (tx, mut rx) = mpsc::channel::<notify::Result<notify::Event>>(16);
        let mut watcher = match notify::recommended_watcher(move |res| {
            let _ = tx.blocking_send(res);
        }) {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "failed to create route file watcher");
                return;
            }
        };

        if let Err(e) = watcher.watch(&self.path, RecursiveMode::NonRecursive) {
            error!(path = %self.path.display(), error = %e, "failed to watch route file");
            return;
        }

        let mut last_reload: Option<Instant> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("file discovery adapter shutting down");
                    return;
                }
                event = rx.recv() => {
                    let Some(event) = event else { return };
                    if event.is_err() {
                        continue;
                    }

                    let now = Instant::now();
                    if last_reload.is_some_and(|t| now.duration_since(t) < DEBOUNCE) {
                        continue;
                    }
                    last_reload = Some(now);

                    match self.load() {
                        Ok(file) => {
                            self.apply(&routes, file);
                            info!(path = %self.path.display(), "reloaded route file");
                        }
                        Err(e) => warn!(path = %self.path.display(), error = %e, "route file reload failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_mappings_and_default_from_parsed_file() {
        let routes = RouteTable::new();
        let discovery = FileDiscovery::new("unused.json");
        let file = RouteFile {
            default_server: Some("default:25565".to_string()),
            mappings: std::collections::HashMap::from([("a.b".to_string(), "10.0.0.1:25565".to_string())]),
        };

        discovery.apply(&routes, file);

        assert_eq!(routes.find("a.b").unwrap().backend, "10.0.0.1:25565");
        assert_eq!(routes.find("unmapped.host").unwrap().backend, "default:25565");
    }

    #[test]
    fn missing_default_server_clears_default_route() {
        let routes = RouteTable::new();
        routes.set_default_route("stale:1", None, None, None, None);

        let discovery = FileDiscovery::new("unused.json");
        discovery.apply(&routes, RouteFile::default());

        assert!(routes.find("anything").is_none());
    }
}
