use super::error::ProtocolError;
use super::frame::{LegacyServerListPing, Packet};
use super::varint::VarInt;

pub const HANDSHAKE_PACKET_ID: i32 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Status,
    Login,
    Transfer,
}

impl NextState {
    fn from_varint(value: i32) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(NextState::Status),
            2 => Ok(NextState::Login),
            3 => Ok(NextState::Transfer),
            _ => Err(ProtocolError::InvalidLegacyPing("unknown next_state")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: NextState,
}

impl Handshake {
    /// Decodes a serverbound Handshake packet body. The server address is
    /// normalized (truncated at the first Forge mod-loader NUL suffix)
    /// before being returned.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = data;

        let (VarInt(protocol_version), n) = VarInt::read_from_slice(cursor)?;
        cursor = &cursor[n..];

        let (raw_address, n) = read_prefixed_utf8(cursor)?;
        cursor = &cursor[n..];

        if cursor.len() < 2 {
            return Err(ProtocolError::UnexpectedEof("handshake server_port"));
        }
        let server_port = u16::from_be_bytes([cursor[0], cursor[1]]);
        cursor = &cursor[2..];

        let (VarInt(next_state_raw), _) = VarInt::read_from_slice(cursor)?;
        let next_state = NextState::from_varint(next_state_raw)?;

        Ok(Handshake {
            protocol_version,
            server_address: truncate_at_nul(&raw_address).to_string(),
            server_port,
            next_state,
        })
    }

    pub fn from_packet(packet: &Packet) -> Result<Self, ProtocolError> {
        if packet.id != HANDSHAKE_PACKET_ID {
            return Err(ProtocolError::UnexpectedContent(packet.id));
        }
        Self::decode(&packet.data)
    }

    /// Synthesizes a Handshake from a decoded legacy ping, always with
    /// `next_state = Status`.
    pub fn from_legacy(legacy: &LegacyServerListPing) -> Self {
        Handshake {
            protocol_version: legacy.protocol_version as i32,
            server_address: truncate_at_nul(&legacy.server_address).to_string(),
            server_port: legacy.server_port as u16,
            next_state: NextState::Status,
        }
    }
}

fn truncate_at_nul(s: &str) -> &str {
    match s.find('\0') {
        Some(idx) => &s[..idx],
        None => s,
    }
}

pub(crate) fn read_prefixed_utf8(data: &[u8]) -> Result<(String, usize), ProtocolError> {
    let (VarInt(len), prefix_len) = VarInt::read_from_slice(data)?;
    let len = len as usize;
    let end = prefix_len + len;
    if data.len() < end {
        return Err(ProtocolError::UnexpectedEof("length-prefixed string"));
    }
    let s = String::from_utf8(data[prefix_len..end].to_vec())
        .map_err(|_| ProtocolError::InvalidLegacyPing("invalid UTF-8 string"))?;
    Ok((s, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_handshake(protocol: i32, address: &str, port: u16, next_state: i32) -> Vec<u8> {
        let mut out = Vec::new();
        VarInt(protocol).write_to_vec(&mut out);
        VarInt(address.len() as i32).write_to_vec(&mut out);
        out.extend_from_slice(address.as_bytes());
        out.extend_from_slice(&port.to_be_bytes());
        VarInt(next_state).write_to_vec(&mut out);
        out
    }

    #[test]
    fn decodes_typical_handshake() {
        let data = encode_handshake(770, "my.domain", 25565, 1);
        let hs = Handshake::decode(&data).unwrap();
        assert_eq!(hs.protocol_version, 770);
        assert_eq!(hs.server_address, "my.domain");
        assert_eq!(hs.server_port, 25565);
        assert_eq!(hs.next_state, NextState::Status);
    }

    #[test]
    fn normalizes_forge_suffix() {
        let data = encode_handshake(767, "my.domain\0FML2\0", 25565, 2);
        let hs = Handshake::decode(&data).unwrap();
        assert_eq!(hs.server_address, "my.domain");
        assert_eq!(hs.next_state, NextState::Login);
    }
}
