//! Ties the protocol, route table, security, and scaling pieces together
//! into the per-connection proxy lifecycle: accept, read just enough of the
//! handshake to route, gate on the wake-allow list, dial or wake the
//! backend, and relay.

pub mod active;
pub mod proxy_header;
pub mod pump;
pub mod tee;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ipnetwork::IpNetwork;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::connector::active::ActiveConnections;
use crate::connector::pump::{pump, PumpResult};
use crate::connector::tee::Tee;
use crate::error::RouterError;
use crate::metrics::MetricsSink;
use crate::notifier::Notifier;
use crate::protocol::{read_frame, status, ConnState, Frame, Handshake, LoginStart, NextState, PlayerInfo};
use crate::route::RouteTable;
use crate::scale::DownScaler;
use crate::security::allowdeny::AllowDenyConfig;
use crate::security::filter::ClientFilter;
use crate::security::rate_limiter::RateLimiter;
use crate::telemetry::new_session_id;

/// From the first handshake byte through the end of login (or the status
/// request/ping exchange against a sleeping backend), per read.
const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct ProxyProtocolConfig {
    pub send_enabled: bool,
    pub receive_enabled: bool,
    pub trusted_cidrs: Vec<IpNetwork>,
}

impl ProxyProtocolConfig {
    fn is_trusted(&self, addr: std::net::IpAddr) -> bool {
        self.receive_enabled && self.trusted_cidrs.iter().any(|net| net.contains(addr))
    }
}

pub struct Connector {
    routes: Arc<RouteTable>,
    filter: Arc<ClientFilter>,
    rate_limiter: Arc<RateLimiter>,
    allow_deny: Arc<AllowDenyConfig>,
    downscaler: Arc<DownScaler>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<dyn MetricsSink>,
    active: Arc<ActiveConnections>,
    proxy_protocol: ProxyProtocolConfig,
    cancel: CancellationToken,
}

impl Connector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        routes: Arc<RouteTable>,
        filter: Arc<ClientFilter>,
        rate_limiter: Arc<RateLimiter>,
        allow_deny: Arc<AllowDenyConfig>,
        downscaler: Arc<DownScaler>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<dyn MetricsSink>,
        proxy_protocol: ProxyProtocolConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            routes,
            filter,
            rate_limiter,
            allow_deny,
            downscaler,
            notifier,
            metrics,
            active: Arc::new(ActiveConnections::new()),
            proxy_protocol,
            cancel,
        })
    }

    pub fn active_connections(&self) -> &Arc<ActiveConnections> {
        &self.active
    }

    /// Binds `listen_address` and spawns the accept loop. Returns once the
    /// listener is bound; the loop itself runs until `cancel` fires.
    pub async fn start(self: &Arc<Self>, listen_address: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(listen_address).await?;
        info!(address = %listen_address, "listening");

        let this = self.clone();
        tokio::spawn(async move { this.accept_loop(listener).await });
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("accept loop shutting down");
                    return;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => self.clone().admit(stream, peer_addr),
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
            }
        }
    }

    /// Applies rate-limit and filter checks before spawning the handler.
    fn admit(self: Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        if !self.rate_limiter.try_acquire() {
            self.metrics.incr_counter("rate_limited", "");
            return;
        }
        if !self.filter.allows(peer_addr.ip()) {
            self.metrics.incr_counter("filtered", "");
            return;
        }
        tokio::spawn(async move { self.handle(stream, peer_addr).await });
    }

    /// Hands an already-accepted connection straight to the handler,
    /// bypassing rate-limit and filter checks.
    pub fn accept(self: &Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let this = self.clone();
        tokio::spawn(async move { this.handle(stream, peer_addr).await });
    }

    pub async fn wait_for_connections(&self) {
        self.active.wait_for_drain().await;
    }

    async fn handle(self: Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let session_id = new_session_id();
        let span = tracing::debug_span!("TCP Connection", %peer_addr, %session_id);
        self.handle_within_span(stream, peer_addr).instrument(span).await
    }

    async fn handle_within_span(self: Arc<Self>, mut stream: TcpStream, peer_addr: SocketAddr) {
        let client_addr = if self.proxy_protocol.is_trusted(peer_addr.ip()) {
            match proxy_header::try_read_v1_header(&mut stream).await {
                Ok(Some(real)) => real,
                Ok(None) => peer_addr,
                Err(e) => {
                    debug!(error = %e, "failed reading PROXY protocol header");
                    peer_addr
                }
            }
        } else {
            peer_addr
        };

        if let Err(e) = self.run_connection(stream, client_addr).await {
            self.metrics.incr_counter(e.metric_name(), "");
            debug!(error = %e, "connection closed with error");
        }
    }

    async fn run_connection(&self, mut stream: TcpStream, client_addr: SocketAddr) -> Result<(), RouterError> {
        let mut tee = Tee::new(&mut stream);

        // One shared deadline covers both the handshake and (if present) the
        // login read, per the proxy's read-deadline contract; a slow client
        // can't win a second 5s window by splitting its bytes across reads.
        let deadline = tokio::time::Instant::now() + HANDSHAKE_DEADLINE;

        let first_frame = timeout_at(deadline, read_frame(&mut tee, ConnState::Handshaking))
            .await
            .map_err(|_| timed_out("handshake"))??;

        let (handshake, is_legacy) = match &first_frame {
            Frame::Packet(packet) => (Handshake::from_packet(packet)?, false),
            Frame::Legacy(legacy) => (Handshake::from_legacy(legacy), true),
        };

        let mut player: Option<PlayerInfo> = None;
        if !is_legacy && handshake.next_state == NextState::Login {
            let login_frame = timeout_at(deadline, read_frame(&mut tee, ConnState::Login))
                .await
                .map_err(|_| timed_out("login"))??;
            match login_frame {
                Frame::Packet(packet) => {
                    player = Some(LoginStart::decode(handshake.protocol_version, &packet.data)?.player);
                }
                Frame::Legacy(_) => return Err(RouterError::UnexpectedContent),
            }
        }

        // Drop the tee here: the handshake (and login, if any) bytes are
        // captured either way, and every further read goes straight to the
        // stream, whether that's the status/ping exchange with an asleep
        // backend or nothing further at all before dialing.
        let prefix = tee.into_captured();

        let resolved = self.routes.find(&handshake.server_address);
        let normalized_address = resolved
            .as_ref()
            .map(|r| r.normalized_address.clone())
            .unwrap_or_else(|| self.routes.normalize(&handshake.server_address));

        let mut backend = resolved.as_ref().map(|r| r.backend.clone()).unwrap_or_default();
        let scale_key = resolved.as_ref().and_then(|r| r.scale_key.clone());
        let asleep_motd = resolved.as_ref().and_then(|r| r.asleep_motd.clone());

        if handshake.next_state != NextState::Status {
            if let Some(r) = &resolved {
                if let Some(waker) = &r.waker {
                    let candidate = player.clone().unwrap_or_default();
                    if self.allow_deny.server_allows_player(&normalized_address, &candidate) {
                        if let Some(key) = &scale_key {
                            self.downscaler.cancel(key);
                        }
                        match waker.wake().await {
                            Ok(new_backend) => backend = new_backend,
                            Err(e) => {
                                self.notifier.backend_wakeup_failed(&normalized_address, &e.0).await;
                                return Err(RouterError::WakeupFailed(e.0));
                            }
                        }
                    }
                }
            }
        }

        if backend.is_empty() {
            return self
                .serve_asleep_or_missing(&mut stream, &handshake, is_legacy, asleep_motd.as_deref())
                .await;
        }

        let mut server_stream = match TcpStream::connect(&backend).await {
            Ok(s) => s,
            Err(e) => {
                self.notifier.backend_dial_failed(&normalized_address, &backend, &e.to_string()).await;
                return Err(RouterError::BackendFailed(e));
            }
        };

        if self.proxy_protocol.send_enabled {
            let local_addr = server_stream.local_addr().map_err(RouterError::ProxyWrite)?;
            proxy_header::write_v2_header(&mut server_stream, client_addr, local_addr)
                .await
                .map_err(RouterError::ProxyWrite)?;
        }

        server_stream.write_all(&prefix).await.map_err(RouterError::BackendFailed)?;

        self.active.increment(&backend);
        self.metrics
            .set_active_connections(&backend, self.active.count_for(&backend) as i64);
        if let Some(p) = &player {
            self.notifier.player_joined(&normalized_address, p).await;
        }

        let (client_read, client_write) = stream.into_split();
        let (server_read, server_write) = server_stream.into_split();

        let result = pump(
            client_read,
            client_write,
            server_read,
            server_write,
            &normalized_address,
            &self.metrics,
            self.cancel.clone(),
        )
        .await;

        let remaining = self.active.decrement(&backend);
        self.metrics.set_active_connections(&backend, remaining as i64);
        if let Some(p) = &player {
            self.notifier.player_left(&normalized_address, p).await;
        }
        if remaining == 0 {
            if let Some(key) = &scale_key {
                self.downscaler.begin(key);
            }
        }

        match result {
            PumpResult::Error(e) => Err(RouterError::Relay(e)),
            _ => Ok(()),
        }
    }

    /// Serves a synthesized status/ping response for a route with no live
    /// backend, or reports `MissingBackend` when there is neither a route
    /// nor an asleep MOTD to fall back on.
    async fn serve_asleep_or_missing(
        &self,
        stream: &mut TcpStream,
        handshake: &Handshake,
        is_legacy: bool,
        asleep_motd: Option<&str>,
    ) -> Result<(), RouterError> {
        let motd = match asleep_motd {
            Some(motd) if handshake.next_state == NextState::Status => motd,
            _ => return Err(RouterError::MissingBackend),
        };

        if is_legacy {
            let response = status::encode_legacy_response(handshake.protocol_version, "mc-router", motd, 0, 0);
            stream.write_all(&response).await.map_err(RouterError::Relay)?;
            return Ok(());
        }

        let status_request = timeout(HANDSHAKE_DEADLINE, read_frame(stream, ConnState::Status))
            .await
            .map_err(|_| timed_out("status request"))??;
        if !matches!(status_request, Frame::Packet(_)) {
            return Err(RouterError::UnexpectedContent);
        }

        let response = status::StatusResponse::asleep(handshake.protocol_version, motd);
        stream
            .write_all(&response.encode_packet())
            .await
            .map_err(RouterError::Relay)?;

        let ping = timeout(HANDSHAKE_DEADLINE, read_frame(stream, ConnState::Status))
            .await
            .map_err(|_| timed_out("ping"))??;
        if let Frame::Packet(packet) = ping {
            let pong = status::encode_pong_packet(&packet.data);
            stream.write_all(&pong).await.map_err(RouterError::Relay)?;
        }

        Ok(())
    }
}

fn timed_out(phase: &'static str) -> RouterError {
    RouterError::ReadDeadline(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("{phase} read timed out"),
    ))
}
