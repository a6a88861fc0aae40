//! Lifecycle signal fan-out: the webhook emitter this proxy can call on
//! connect/disconnect/failure events. The admin API and any other
//! consumer of these signals are external collaborators; this crate only
//! needs the trait and a webhook-backed implementation.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::protocol::PlayerInfo;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn player_joined(&self, server_address: &str, player: &PlayerInfo);
    async fn player_left(&self, server_address: &str, player: &PlayerInfo);
    async fn backend_dial_failed(&self, server_address: &str, backend: &str, error: &str);
    async fn backend_wakeup_failed(&self, server_address: &str, error: &str);
}

#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn player_joined(&self, _server_address: &str, _player: &PlayerInfo) {}
    async fn player_left(&self, _server_address: &str, _player: &PlayerInfo) {}
    async fn backend_dial_failed(&self, _server_address: &str, _backend: &str, _error: &str) {}
    async fn backend_wakeup_failed(&self, _server_address: &str, _error: &str) {}
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WebhookEvent<'a> {
    PlayerJoined {
        server_address: &'a str,
        player: &'a str,
    },
    PlayerLeft {
        server_address: &'a str,
        player: &'a str,
    },
    BackendDialFailed {
        server_address: &'a str,
        backend: &'a str,
        error: &'a str,
    },
    BackendWakeupFailed {
        server_address: &'a str,
        error: &'a str,
    },
}

pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, event: &WebhookEvent<'_>) {
        if let Err(e) = self.client.post(&self.url).json(event).send().await {
            warn!(url = %self.url, error = %e, "webhook POST failed");
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn player_joined(&self, server_address: &str, player: &PlayerInfo) {
        self.post(&WebhookEvent::PlayerJoined {
            server_address,
            player: &player.name,
        })
        .await;
    }

    async fn player_left(&self, server_address: &str, player: &PlayerInfo) {
        self.post(&WebhookEvent::PlayerLeft {
            server_address,
            player: &player.name,
        })
        .await;
    }

    async fn backend_dial_failed(&self, server_address: &str, backend: &str, error: &str) {
        self.post(&WebhookEvent::BackendDialFailed {
            server_address,
            backend,
            error,
        })
        .await;
    }

    async fn backend_wakeup_failed(&self, server_address: &str, error: &str) {
        self.post(&WebhookEvent::BackendWakeupFailed {
            server_address,
            error,
        })
        .await;
    }
}
