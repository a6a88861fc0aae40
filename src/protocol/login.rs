use uuid::Uuid;

use super::error::ProtocolError;
use super::handshake::read_prefixed_utf8;
use super::varint::VarInt;

/// Protocol 1.19 (759) through 1.19.1 (760), exclusive on the upper end.
const PROTOCOL_1_19: i32 = 759;
/// Protocol 1.19.2.
const PROTOCOL_1_19_2: i32 = 760;
/// Protocol 1.20.2, from which a UUID is always present.
const PROTOCOL_1_20_2: i32 = 764;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerInfo {
    pub name: String,
    pub uuid: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct LoginStart {
    pub player: PlayerInfo,
}

impl LoginStart {
    /// Decodes a serverbound LoginStart packet body. The shape of the
    /// trailing fields depends on `protocol`, the version carried by the
    /// just-parsed Handshake — never a global setting.
    pub fn decode(protocol: i32, data: &[u8]) -> Result<Self, ProtocolError> {
        let (name, mut offset) = read_prefixed_utf8(data)?;

        let uuid = if (PROTOCOL_1_19..PROTOCOL_1_19_2).contains(&protocol) {
            let has_sig = read_bool(data, &mut offset)?;
            if has_sig {
                skip_signature_data(data, &mut offset)?;
            }
            None
        } else if (PROTOCOL_1_19_2..PROTOCOL_1_20_2).contains(&protocol) {
            let has_uuid = read_bool(data, &mut offset)?;
            if has_uuid {
                Some(read_uuid(data, &mut offset)?)
            } else {
                None
            }
        } else if protocol >= PROTOCOL_1_20_2 {
            Some(read_uuid(data, &mut offset)?)
        } else {
            None
        };

        Ok(LoginStart {
            player: PlayerInfo { name, uuid },
        })
    }
}

fn read_bool(data: &[u8], offset: &mut usize) -> Result<bool, ProtocolError> {
    let byte = data
        .get(*offset)
        .ok_or(ProtocolError::UnexpectedEof("login start boolean"))?;
    *offset += 1;
    Ok(*byte != 0)
}

fn read_uuid(data: &[u8], offset: &mut usize) -> Result<Uuid, ProtocolError> {
    let end = *offset + 16;
    let slice = data
        .get(*offset..end)
        .ok_or(ProtocolError::UnexpectedEof("login start uuid"))?;
    *offset = end;
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(slice);
    Ok(Uuid::from_bytes(bytes))
}

fn skip_signature_data(data: &[u8], offset: &mut usize) -> Result<(), ProtocolError> {
    // long expiration
    *offset += 8;
    if *offset > data.len() {
        return Err(ProtocolError::UnexpectedEof("signature expiration"));
    }

    let (public_key, len) = read_prefixed_bytes(data, *offset)?;
    *offset += len;
    let _ = public_key;

    let (signature, len) = read_prefixed_bytes(data, *offset)?;
    *offset += len;
    let _ = signature;

    Ok(())
}

fn read_prefixed_bytes(data: &[u8], offset: usize) -> Result<(&[u8], usize), ProtocolError> {
    let rest = data
        .get(offset..)
        .ok_or(ProtocolError::UnexpectedEof("prefixed byte array"))?;
    let (VarInt(len), prefix_len) = VarInt::read_from_slice(rest)?;
    let len = len as usize;
    let end = prefix_len + len;
    let slice = rest
        .get(prefix_len..end)
        .ok_or(ProtocolError::UnexpectedEof("prefixed byte array body"))?;
    Ok((slice, end))
}
