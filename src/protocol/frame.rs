//! Length-prefixed packet framing and the legacy (pre-1.7) ping ladder.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::ProtocolError;
use super::varint::{VarInt, MAX_VARINT_LEN};

/// Largest declared frame length the protocol allows (2^21 - 1).
pub const MAX_FRAME_LEN: i32 = 2_097_151;

/// Where in the handshake lifecycle a connection currently is. Only
/// `Handshaking` triggers the legacy-ping branch in [`read_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Handshaking,
    Status,
    Login,
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub id: i32,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct LegacyServerListPing {
    pub protocol_version: u8,
    pub server_address: String,
    pub server_port: u32,
}

#[derive(Debug, Clone)]
pub enum Frame {
    Packet(Packet),
    Legacy(LegacyServerListPing),
}

/// Reads one frame from `reader`. In `Handshaking` state, a leading `0xFE`
/// byte diverts into the legacy ping ladder instead of ordinary framing.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    state: ConnState,
) -> Result<Frame, ProtocolError> {
    let first_byte = reader.read_u8().await?;

    if state == ConnState::Handshaking && first_byte == 0xFE {
        return read_legacy_ping(reader).await.map(Frame::Legacy);
    }

    let length = finish_varint(reader, first_byte).await?;
    if length < 0 || length > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await?;

    let (VarInt(id), id_len) = VarInt::read_from_slice(&payload)?;
    Ok(Frame::Packet(Packet {
        id,
        data: Bytes::copy_from_slice(&payload[id_len..]),
    }))
}

/// Completes a VarInt whose first byte has already been consumed.
async fn finish_varint<R: AsyncRead + Unpin>(
    reader: &mut R,
    first_byte: u8,
) -> Result<i32, ProtocolError> {
    let mut value = (first_byte & 0x7F) as i32;
    if first_byte & 0x80 == 0 {
        return Ok(value);
    }

    for i in 1..MAX_VARINT_LEN {
        let byte = reader.read_u8().await?;
        value |= ((byte & 0x7F) as i32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ProtocolError::VarIntTooLong)
}

/// Decodes the fixed `0xFE 0x01 0xFA "MC|PingHost" ...` ladder. The leading
/// `0xFE` has already been consumed by the caller.
async fn read_legacy_ping<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<LegacyServerListPing, ProtocolError> {
    let marker = reader.read_u8().await?;
    if marker != 0x01 {
        return Err(ProtocolError::InvalidLegacyPing("expected 0x01 after 0xFE"));
    }

    let plugin_id = reader.read_u8().await?;
    if plugin_id != 0xFA {
        return Err(ProtocolError::InvalidLegacyPing("expected 0xFA plugin message id"));
    }

    let channel_len = reader.read_u16().await?;
    if channel_len != 11 {
        return Err(ProtocolError::InvalidLegacyPing(
            "MC|PingHost channel name length must be 11",
        ));
    }
    let channel = read_utf16be(reader, channel_len as usize).await?;
    if channel != "MC|PingHost" {
        return Err(ProtocolError::InvalidLegacyPing("expected channel MC|PingHost"));
    }

    let _remaining_len = reader.read_u16().await?;
    let protocol_version = reader.read_u8().await?;
    let hostname_len = reader.read_u16().await?;
    let server_address = read_utf16be(reader, hostname_len as usize).await?;
    let server_port = reader.read_u32().await?;

    Ok(LegacyServerListPing {
        protocol_version,
        server_address,
        server_port,
    })
}

async fn read_utf16be<R: AsyncRead + Unpin>(
    reader: &mut R,
    char_count: usize,
) -> Result<String, ProtocolError> {
    let mut units = Vec::with_capacity(char_count);
    for _ in 0..char_count {
        units.push(reader.read_u16().await?);
    }
    String::from_utf16(&units)
        .map_err(|_| ProtocolError::InvalidLegacyPing("invalid UTF-16BE string"))
}

/// Encodes a string as length-prefixed (u16, big-endian code units) UTF-16BE,
/// used both by the legacy ping ladder and its `0xFF` response.
pub fn write_utf16be(out: &mut Vec<u8>, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    out.extend_from_slice(&(units.len() as u16).to_be_bytes());
    for unit in units {
        out.extend_from_slice(&unit.to_be_bytes());
    }
}
