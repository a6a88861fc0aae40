use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("varint used more than 5 continuation bytes")]
    VarIntTooLong,

    #[error("frame length {0} exceeds the maximum of {max}", max = super::frame::MAX_FRAME_LEN)]
    FrameTooLarge(i32),

    #[error("unexpected end of stream while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("malformed legacy server list ping: {0}")]
    InvalidLegacyPing(&'static str),

    #[error("packet id 0x{0:02x} was neither a handshake nor a legacy ping")]
    UnexpectedContent(i32),
}
