//! Process-wide `tracing` setup. Every per-connection task wraps its work in
//! a span carrying the peer address and a generated session id, so logs
//! from concurrent connections stay attributable.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Installs the global subscriber. Call once, at process start.
pub fn init() {
    let log_level = if cfg!(debug_assertions) { Level::DEBUG } else { Level::INFO };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_level(true)
        .with_target(false);

    let env_filter = EnvFilter::from_str(&format!("mc_router_rs={log_level}"))
        .unwrap_or_else(|_| EnvFilter::from_default_env());

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}

/// A random per-connection correlation id for the `debug_span!` below.
pub fn new_session_id() -> Uuid {
    Uuid::new_v4()
}
