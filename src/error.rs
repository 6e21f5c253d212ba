use crate::packet::ParseError;

/// Internal error taxonomy for a single transfer session.
///
/// Distinct from the wire `ErrorCode`: this is how failures travel between
/// the engine, the dispatcher, and the log, before (optionally) being
/// translated into an outbound `ERROR` packet.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("malformed datagram: {0}")]
    Parse(#[from] ParseError),

    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("peer sent error {code}: {message}")]
    Remote { code: u16, message: String },

    #[error("client timed out after {0} retries")]
    ClientTimeout(u32),
}

impl SessionError {
    /// Whether this error warrants sending an outbound `ERROR` packet
    /// before tearing the session down.
    pub fn should_reply(&self) -> bool {
        matches!(self, SessionError::LocalIo(_))
    }
}
