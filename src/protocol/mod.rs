//! The Minecraft Java Edition wire protocol surface this proxy needs:
//! variable-length integers, length-prefixed framing, the legacy ping
//! ladder, and version-aware Handshake/LoginStart decoding.

pub mod error;
pub mod frame;
pub mod handshake;
pub mod login;
pub mod status;
pub mod varint;

pub use error::ProtocolError;
pub use frame::{read_frame, ConnState, Frame, LegacyServerListPing, Packet, MAX_FRAME_LEN};
pub use handshake::{Handshake, NextState};
pub use login::{LoginStart, PlayerInfo};
pub use varint::VarInt;
