//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Frame errors
    /// String exceeds the maximum encodable length.
    #[error("string too long: {size} bytes exceeds maximum of {max} bytes")]
    StringTooLong {
        /// Encoded length of the rejected string.
        size: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// String payload is not valid UTF-8.
    #[error("invalid utf-8 in string frame: {0}")]
    InvalidUtf8(String),

    /// A length field carried a value that cannot describe a byte run.
    #[error("invalid length field: {0}")]
    InvalidLength(i64),

    /// Buffer does not yet hold a complete frame.
    #[error("insufficient data: need {need} bytes, have {have}")]
    Incomplete {
        /// Bytes required to finish the frame.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// The peer answered with a token that is not valid at this point.
    #[error("unexpected reply: expected {expected}, got {got:?}")]
    UnexpectedReply {
        /// What the current protocol state allows.
        expected: String,
        /// What was actually received.
        got: String,
    },

    // Connection errors
    /// Connection was closed before a frame or byte run completed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Any other transport failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl ProtocolError {
    /// True for failures of the underlying connection rather than of the
    /// byte content. Either kind ends the session; connection failures end it
    /// without any further message, since the peer can no longer be reached.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ProtocolError::ConnectionClosed(_) | ProtocolError::Io(_))
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed(err.to_string()),
            _ => ProtocolError::Io(err.to_string()),
        }
    }
}

impl From<std::string::FromUtf8Error> for ProtocolError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        ProtocolError::InvalidUtf8(err.to_string())
    }
}
