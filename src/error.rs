//! The connection-handler error taxonomy from spec §7. Every variant is a
//! distinct metrics counter name; none of them are fatal to the process —
//! they are logged, counted, and the connection is closed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("handshake read deadline: {0}")]
    ReadDeadline(#[source] std::io::Error),

    #[error("malformed frame or decode failure: {0}")]
    Read(#[from] crate::protocol::ProtocolError),

    #[error("first packet was neither a handshake nor a legacy ping")]
    UnexpectedContent,

    #[error("no route matched and no default route is configured")]
    MissingBackend,

    #[error("waker returned an error: {0}")]
    WakeupFailed(String),

    #[error("backend connect or relay failed: {0}")]
    BackendFailed(#[source] std::io::Error),

    #[error("PROXY protocol header write failed: {0}")]
    ProxyWrite(#[source] std::io::Error),

    #[error("relay error: {0}")]
    Relay(#[source] std::io::Error),
}

impl RouterError {
    /// The metrics counter name this error increments, matching the
    /// taxonomy's kind names verbatim.
    pub fn metric_name(&self) -> &'static str {
        match self {
            RouterError::ReadDeadline(_) => "read_deadline",
            RouterError::Read(_) => "read",
            RouterError::UnexpectedContent => "unexpected_content",
            RouterError::MissingBackend => "missing_backend",
            RouterError::WakeupFailed(_) => "wakeup_failed",
            RouterError::BackendFailed(_) => "backend_failed",
            RouterError::ProxyWrite(_) => "proxy_write",
            RouterError::Relay(_) => "relay",
        }
    }
}
