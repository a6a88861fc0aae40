//! Variable-length integer encoding used throughout the Minecraft protocol.
//!
//! 7 bits of payload per byte, high bit set to signal continuation, at most
//! 5 bytes for any value that fits in an i32.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::ProtocolError;

pub const MAX_VARINT_LEN: usize = 5;

/// An i32 encoded as a Minecraft VarInt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VarInt(pub i32);

impl VarInt {
    pub fn encoded_len(self) -> usize {
        let mut value = self.0 as u32;
        let mut len = 1;
        while value >= 0x80 {
            value >>= 7;
            len += 1;
        }
        len
    }

    pub async fn read_async<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut value: i32 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = reader.read_u8().await?;
            value |= ((byte & 0x7F) as i32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(VarInt(value));
            }
        }
        Err(ProtocolError::VarIntTooLong)
    }

    pub async fn write_async<W: AsyncWrite + Unpin>(
        self,
        writer: &mut W,
    ) -> Result<(), ProtocolError> {
        let mut value = self.0 as u32;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            writer.write_u8(byte).await?;
            if value == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Synchronous decode used for already-buffered packet payloads.
    pub fn read_from_slice(data: &[u8]) -> Result<(Self, usize), ProtocolError> {
        let mut value: i32 = 0;
        for (i, byte) in data.iter().enumerate().take(MAX_VARINT_LEN) {
            value |= ((byte & 0x7F) as i32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok((VarInt(value), i + 1));
            }
        }
        Err(ProtocolError::VarIntTooLong)
    }

    pub fn write_to_vec(self, out: &mut Vec<u8>) {
        let mut value = self.0 as u32;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if value == 0 {
                break;
            }
        }
    }
}
