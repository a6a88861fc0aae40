//! Status-phase responses: the JSON status packet served by sleeping
//! backends, and the legacy (pre-1.7) `0xFF` ping reply.

use serde::Serialize;

use super::frame::write_utf16be;
use super::varint::VarInt;

pub const STATUS_RESPONSE_PACKET_ID: i32 = 0x00;
pub const PONG_PACKET_ID: i32 = 0x01;

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub version: VersionField,
    pub players: PlayersField,
    pub description: DescriptionField,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionField {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayersField {
    pub max: i32,
    pub online: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DescriptionField {
    pub text: String,
}

impl StatusResponse {
    /// Builds the synthesized status response for a backend that is asleep,
    /// per spec: `{version:{name,protocol},players:{max:0,online:0},description:{text}}`.
    pub fn asleep(protocol_version: i32, motd: &str) -> Self {
        StatusResponse {
            version: VersionField {
                name: format!("mc-router {protocol_version}"),
                protocol: protocol_version,
            },
            players: PlayersField { max: 0, online: 0 },
            description: DescriptionField {
                text: motd.to_string(),
            },
        }
    }

    /// Encodes the full framed Status Response packet ready to write.
    pub fn encode_packet(&self) -> Vec<u8> {
        let json = serde_json::to_string(self).expect("StatusResponse always serializes");

        let mut body = Vec::new();
        VarInt(STATUS_RESPONSE_PACKET_ID).write_to_vec(&mut body);
        VarInt(json.len() as i32).write_to_vec(&mut body);
        body.extend_from_slice(json.as_bytes());

        let mut framed = Vec::new();
        VarInt(body.len() as i32).write_to_vec(&mut framed);
        framed.extend_from_slice(&body);
        framed
    }
}

/// Encodes a Pong packet echoing the client's Ping payload verbatim.
pub fn encode_pong_packet(ping_payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    VarInt(PONG_PACKET_ID).write_to_vec(&mut body);
    body.extend_from_slice(ping_payload);

    let mut framed = Vec::new();
    VarInt(body.len() as i32).write_to_vec(&mut framed);
    framed.extend_from_slice(&body);
    framed
}

/// Encodes the legacy `0xFF` kick response carrying six `\0`-separated
/// UTF-16BE fields: `§1\0<protocol>\0<version>\0<motd>\0<online>\0<max>`.
pub fn encode_legacy_response(
    protocol_version: i32,
    version_name: &str,
    motd: &str,
    online: u32,
    max: u32,
) -> Vec<u8> {
    let joined = format!(
        "\u{00A7}1\0{protocol_version}\0{version_name}\0{motd}\0{online}\0{max}"
    );

    let mut out = vec![0xFFu8];
    write_utf16be(&mut out, &joined);
    out
}
