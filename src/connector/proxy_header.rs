//! PROXY protocol support: writing a v2 header to the backend when
//! `send_proxy_protocol` is enabled, and parsing a v1 header from a
//! trusted front-end when `receive_proxy_protocol` is enabled.

use std::net::SocketAddr;

use proxy_protocol::version2::{ProxyAddresses as V2Addresses, ProxyCommand, ProxyTransportProtocol};
use proxy_protocol::{encode, ProxyHeader};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Writes a PROXY-v2 header to `stream`, `TCP4` or `TCP6` depending on the
/// front-end local address family, before anything else is written.
pub async fn write_v2_header(
    stream: &mut TcpStream,
    client_addr: SocketAddr,
    local_addr: SocketAddr,
) -> std::io::Result<()> {
    let (addresses, transport_protocol) = match (client_addr, local_addr) {
        (SocketAddr::V4(source), SocketAddr::V4(destination)) => (
            V2Addresses::Ipv4 { source, destination },
            ProxyTransportProtocol::Stream,
        ),
        (SocketAddr::V6(source), SocketAddr::V6(destination)) => (
            V2Addresses::Ipv6 { source, destination },
            ProxyTransportProtocol::Stream,
        ),
        _ => (V2Addresses::Unspec, ProxyTransportProtocol::Unspec),
    };

    let header = ProxyHeader::Version2 {
        command: ProxyCommand::Proxy,
        transport_protocol,
        addresses,
    };

    let encoded =
        encode(header).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    stream.write_all(&encoded).await
}

/// Reads and parses a textual PROXY protocol v1 header
/// (`PROXY TCP4 <src> <dst> <sport> <dport>\r\n`) directly off `stream`,
/// consuming exactly those bytes. Returns `None` (having consumed nothing)
/// if the connection does not start with the `PROXY ` preamble.
pub async fn try_read_v1_header(stream: &mut TcpStream) -> std::io::Result<Option<SocketAddr>> {
    let mut preamble = [0u8; 6];
    let peeked = stream.peek(&mut preamble).await?;
    if peeked < 6 || &preamble != b"PROXY " {
        return Ok(None);
    }

    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await?;
        line.push(byte[0]);
        if line.ends_with(b"\r\n") || line.len() > 107 {
            break;
        }
    }

    let text = String::from_utf8_lossy(&line);
    let parts: Vec<&str> = text.trim_end().split(' ').collect();
    if parts.len() < 6 {
        return Ok(None);
    }

    let source_ip: std::net::IpAddr = match parts[2].parse() {
        Ok(ip) => ip,
        Err(_) => return Ok(None),
    };
    let source_port: u16 = match parts[4].parse() {
        Ok(p) => p,
        Err(_) => return Ok(None),
    };

    Ok(Some(SocketAddr::new(source_ip, source_port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_proxy_stream_is_left_untouched() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"\x00\x0fhandshake-bytes").await.unwrap();
        });

        let (mut server_side, _) = listener.accept().await.unwrap();
        let result = try_read_v1_header(&mut server_side).await.unwrap();
        assert!(result.is_none());

        let mut buf = [0u8; 2];
        server_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x00\x0f");

        client.await.unwrap();
    }

    #[tokio::test]
    async fn parses_proxy_v1_preamble() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"PROXY TCP4 203.0.113.5 198.51.100.1 51234 25565\r\n")
                .await
                .unwrap();
        });

        let (mut server_side, _) = listener.accept().await.unwrap();
        let result = try_read_v1_header(&mut server_side).await.unwrap();
        assert_eq!(
            result,
            Some(SocketAddr::new("203.0.113.5".parse().unwrap(), 51234))
        );

        client.await.unwrap();
    }
}
