//! End-to-end scenarios driven entirely through public APIs: a `Connector`
//! bound to a loopback listener, a real client socket, and a real backend
//! socket. Each test exercises one of the named request shapes the proxy
//! has to handle correctly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use mc_router_rs::connector::{Connector, ProxyProtocolConfig};
use mc_router_rs::metrics::noop;
use mc_router_rs::notifier::NoopNotifier;
use mc_router_rs::protocol::VarInt;
use mc_router_rs::route::{RouteTable, SleepError, Sleeper, WakeError, Waker};
use mc_router_rs::scale::DownScaler;
use mc_router_rs::security::allowdeny::{AllowDenyConfig, PlayerListEntry};
use mc_router_rs::security::filter::ClientFilter;
use mc_router_rs::security::rate_limiter::RateLimiter;

fn spawn_connector(routes: Arc<RouteTable>, allow_deny: AllowDenyConfig) -> Arc<Connector> {
    let cancel = CancellationToken::new();
    let downscaler = DownScaler::new(routes.clone(), false, Duration::from_secs(30), cancel.clone());
    Connector::new(
        routes,
        Arc::new(ClientFilter::allow_all()),
        Arc::new(RateLimiter::new(1000)),
        Arc::new(allow_deny),
        downscaler,
        Arc::new(NoopNotifier),
        noop(),
        ProxyProtocolConfig::default(),
        cancel,
    )
}

fn encode_handshake(address: &str, next_state: i32) -> Vec<u8> {
    let mut body = Vec::new();
    VarInt(0x00).write_to_vec(&mut body);
    VarInt(770).write_to_vec(&mut body);
    VarInt(address.len() as i32).write_to_vec(&mut body);
    body.extend_from_slice(address.as_bytes());
    body.extend_from_slice(&25565u16.to_be_bytes());
    VarInt(next_state).write_to_vec(&mut body);

    let mut framed = Vec::new();
    VarInt(body.len() as i32).write_to_vec(&mut framed);
    framed.extend_from_slice(&body);
    framed
}

fn encode_login(address: &str, name: &str, uuid: uuid::Uuid) -> Vec<u8> {
    let mut out = encode_handshake(address, 2);

    let mut body = Vec::new();
    VarInt(0x00).write_to_vec(&mut body);
    VarInt(name.len() as i32).write_to_vec(&mut body);
    body.extend_from_slice(name.as_bytes());
    body.extend_from_slice(uuid.as_bytes());

    let mut framed = Vec::new();
    VarInt(body.len() as i32).write_to_vec(&mut framed);
    framed.extend_from_slice(&body);
    out.extend_from_slice(&framed);
    out
}

fn encode_legacy_ping(hostname: &str, port: u32) -> Vec<u8> {
    let mut bytes = vec![0xFEu8, 0x01, 0xFA];
    bytes.extend_from_slice(&11u16.to_be_bytes());
    for unit in "MC|PingHost".encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }

    let mut payload = vec![74u8]; // protocol version
    payload.extend_from_slice(&(hostname.encode_utf16().count() as u16).to_be_bytes());
    for unit in hostname.encode_utf16() {
        payload.extend_from_slice(&unit.to_be_bytes());
    }
    payload.extend_from_slice(&port.to_be_bytes());

    bytes.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&payload);
    bytes
}

#[tokio::test]
async fn forge_handshake_normalizes_lookup_but_relays_raw_bytes() {
    let routes = Arc::new(RouteTable::new());
    let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend_listener.local_addr().unwrap();
    routes.create_mapping("my.domain", backend_addr.to_string(), None, None, None, None);

    let connector = spawn_connector(routes, AllowDenyConfig::default());
    let front_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let front_addr = front_listener.local_addr().unwrap();

    let handshake = encode_handshake("my.domain\0FML2\0", 1);
    let expected_prefix = handshake.clone();

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(front_addr).await.unwrap();
        stream.write_all(&handshake).await.unwrap();
        stream
    });

    let (stream, peer) = front_listener.accept().await.unwrap();
    connector.accept(stream, peer);

    let _client_stream = client.await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), async {
        let (mut backend_stream, _) = backend_listener.accept().await.unwrap();
        let mut buf = vec![0u8; expected_prefix.len()];
        backend_stream.read_exact(&mut buf).await.unwrap();
        buf
    })
    .await
    .expect("backend should receive the NUL-suffixed prefix verbatim");

    assert_eq!(received, expected_prefix);
}

#[tokio::test]
async fn trailing_dot_hostname_resolves_to_mapped_backend() {
    let routes = Arc::new(RouteTable::new());
    let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend_listener.local_addr().unwrap();
    routes.create_mapping("my.domain", backend_addr.to_string(), None, None, None, None);

    let connector = spawn_connector(routes, AllowDenyConfig::default());
    let front_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let front_addr = front_listener.local_addr().unwrap();

    let handshake = encode_handshake("my.domain.", 1);

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(front_addr).await.unwrap();
        stream.write_all(&handshake).await.unwrap();
        stream
    });

    let (stream, peer) = front_listener.accept().await.unwrap();
    connector.accept(stream, peer);
    client.await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), backend_listener.accept())
        .await
        .expect("trailing-dot hostname should resolve to the mapped backend")
        .unwrap();
}

#[tokio::test]
async fn legacy_ping_against_asleep_backend_gets_0xff_response() {
    let routes = Arc::new(RouteTable::new());
    routes.set_default_route(String::new(), None, None, None, Some("Server is sleeping".to_string()));

    let connector = spawn_connector(routes, AllowDenyConfig::default());
    let front_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let front_addr = front_listener.local_addr().unwrap();

    let ping = encode_legacy_ping("my.domain", 25565);

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(front_addr).await.unwrap();
        stream.write_all(&ping).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    });

    let (stream, peer) = front_listener.accept().await.unwrap();
    connector.accept(stream, peer);

    let response = tokio::time::timeout(Duration::from_secs(1), client)
        .await
        .expect("legacy response should arrive within the deadline")
        .unwrap();

    assert_eq!(response[0], 0xFF);
    let body = &response[3..];
    let units: Vec<u16> = body.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
    let decoded = String::from_utf16(&units).unwrap();
    let fields: Vec<&str> = decoded.split('\0').collect();
    assert_eq!(fields.len(), 6);
    assert_eq!(fields[3], "Server is sleeping");
}

#[tokio::test]
async fn status_request_against_asleep_backend_gets_synthesized_response() {
    let routes = Arc::new(RouteTable::new());
    routes.create_mapping("my.domain", String::new(), None, None, None, Some("Server is sleeping".to_string()));

    let connector = spawn_connector(routes, AllowDenyConfig::default());
    let front_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let front_addr = front_listener.local_addr().unwrap();

    let handshake = encode_handshake("my.domain", 1);

    let ping_payload = vec![0xAB, 0xCD, 0xEF, 0x01];
    let mut ping_packet_body = Vec::new();
    VarInt(0x01).write_to_vec(&mut ping_packet_body);
    ping_packet_body.extend_from_slice(&ping_payload);
    let mut ping_packet = Vec::new();
    VarInt(ping_packet_body.len() as i32).write_to_vec(&mut ping_packet);
    ping_packet.extend_from_slice(&ping_packet_body);

    let mut status_request_body = Vec::new();
    VarInt(0x00).write_to_vec(&mut status_request_body);
    let mut status_request = Vec::new();
    VarInt(status_request_body.len() as i32).write_to_vec(&mut status_request);
    status_request.extend_from_slice(&status_request_body);

    let ping_packet_for_client = ping_packet.clone();
    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(front_addr).await.unwrap();
        stream.write_all(&handshake).await.unwrap();
        stream.write_all(&status_request).await.unwrap();
        stream.write_all(&ping_packet_for_client).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    });

    let (stream, peer) = front_listener.accept().await.unwrap();
    connector.accept(stream, peer);

    let response = tokio::time::timeout(Duration::from_secs(1), client)
        .await
        .expect("status response should arrive within the deadline")
        .unwrap();

    // Status Response packet, then Pong echoing the ping payload.
    let (VarInt(status_len), n) = VarInt::read_from_slice(&response).unwrap();
    let status_body = &response[n..n + status_len as usize];
    let (VarInt(_id), id_len) = VarInt::read_from_slice(status_body).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&status_body[id_len..]).unwrap();
    assert_eq!(json["description"]["text"], "Server is sleeping");
    assert_eq!(json["players"]["online"], 0);

    let remaining = &response[n + status_len as usize..];
    assert_eq!(remaining, ping_packet.as_slice());
}

struct RecordingWaker {
    calls: Arc<AtomicBool>,
    new_backend: String,
}

#[async_trait]
impl Waker for RecordingWaker {
    async fn wake(&self) -> Result<String, WakeError> {
        self.calls.store(true, Ordering::SeqCst);
        Ok(self.new_backend.clone())
    }
}

struct UnusedSleeper;

#[async_trait]
impl Sleeper for UnusedSleeper {
    async fn sleep(&self) -> Result<(), SleepError> {
        Ok(())
    }
}

#[tokio::test]
async fn login_from_allowlisted_player_wakes_backend_and_replays_to_new_endpoint() {
    let routes = Arc::new(RouteTable::new());

    let new_backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let new_backend_addr = new_backend_listener.local_addr().unwrap();

    let wake_called = Arc::new(AtomicBool::new(false));
    let waker = Arc::new(RecordingWaker {
        calls: wake_called.clone(),
        new_backend: new_backend_addr.to_string(),
    });
    let sleeper = Arc::new(UnusedSleeper);

    routes.create_mapping(
        "my.domain",
        String::new(), // asleep: empty backend until waker runs
        Some("my-scale-key".to_string()),
        Some(waker as Arc<dyn Waker>),
        Some(sleeper as Arc<dyn Sleeper>),
        None,
    );

    let player_uuid = uuid::Uuid::new_v4();
    let mut allow_deny = AllowDenyConfig::default();
    allow_deny.global.allow.push(PlayerListEntry {
        name: Some("Steve".to_string()),
        uuid: None,
    });
    let connector = spawn_connector(routes, allow_deny);
    let front_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let front_addr = front_listener.local_addr().unwrap();

    let login_bytes = encode_login("my.domain", "Steve", player_uuid);
    let expected_prefix = login_bytes.clone();

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(front_addr).await.unwrap();
        stream.write_all(&login_bytes).await.unwrap();
        stream
    });

    let (stream, peer) = front_listener.accept().await.unwrap();
    connector.accept(stream, peer);
    let _client_stream = client.await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), async {
        let (mut backend_stream, _) = new_backend_listener.accept().await.unwrap();
        let mut buf = vec![0u8; expected_prefix.len()];
        backend_stream.read_exact(&mut buf).await.unwrap();
        buf
    })
    .await
    .expect("woken backend should receive the replayed login bytes");

    assert!(wake_called.load(Ordering::SeqCst), "waker should have been invoked exactly once");
    assert_eq!(received, expected_prefix);
}
