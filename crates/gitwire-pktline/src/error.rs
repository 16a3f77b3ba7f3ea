//! Pkt-line error types.

use thiserror::Error;

/// Errors that can occur while framing or unframing pkt-lines.
#[derive(Debug, Error)]
pub enum PktLineError {
    /// The length header is not 4 hex digits, or names a reserved length.
    #[error("invalid pkt-len found: {0:?}")]
    InvalidLength(String),

    /// The stream ended before the declared payload was read.
    #[error("unexpected EOF: expected {expected} payload bytes, got {read}")]
    UnexpectedEof {
        /// Payload length announced by the header.
        expected: usize,
        /// Bytes actually available.
        read: usize,
    },

    /// The payload does not fit in a 4-digit length header.
    #[error("payload too long: {0} bytes")]
    PayloadTooLong(usize),

    /// Error from the underlying stream, passed through unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PktLineError {
    /// Returns true if this is a malformed length header.
    pub fn is_invalid_length(&self) -> bool {
        matches!(self, Self::InvalidLength(_))
    }
}
