//! mc-router - reverse proxy for Minecraft Java Edition
//!
//! Command-line entry point: parses flags, loads config, starts the
//! listener, and blocks until shutdown.

use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use mc_router_rs::cli::ShutdownController;
use mc_router_rs::config::{Args, RouterConfig};
use mc_router_rs::{telemetry, Router};

#[tokio::main]
async fn main() {
    telemetry::init();

    let args = Args::parse();

    let config = match RouterConfig::build(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            process::exit(1);
        }
    };

    let shutdown = ShutdownController::new();

    let router = match Router::new(config, shutdown.clone()) {
        Ok(router) => Arc::new(router),
        Err(e) => {
            error!(error = %e, "failed to build router");
            process::exit(1);
        }
    };

    if let Err(e) = router.run().await {
        error!(error = %e, "failed to start listener");
        process::exit(1);
    }

    info!("mc-router started");

    router.cancellation_token().cancelled().await;
    router.wait_for_connections().await;
    info!("shutdown complete");
}
