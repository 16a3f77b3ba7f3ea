//! Protocol error types.

use gitwire_pktline::PktLineError;
use thiserror::Error;

/// Errors that can occur while decoding or encoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A flush-pkt appeared where a line was required.
    #[error("unexpected flush")]
    UnexpectedFlush,

    /// A line that does not belong to the current message.
    #[error("unexpected content {0:?}")]
    UnexpectedContent(String),

    /// An ACK line too short to carry a hash.
    #[error("malformed ACK {0:?}")]
    MalformedAck(String),

    /// A hash that is not 40 hex characters.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// Any other malformed message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The peer reported an error (ERR line or side-band channel 3).
    #[error("remote error: {0}")]
    RemoteError(String),

    /// Framing error.
    #[error(transparent)]
    PktLine(#[from] PktLineError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Builds an `UnexpectedContent` error from raw line bytes.
    pub(crate) fn unexpected(line: &[u8]) -> Self {
        Self::UnexpectedContent(String::from_utf8_lossy(line).into_owned())
    }

    /// Returns true if the underlying pkt-line header was invalid.
    pub fn is_invalid_length(&self) -> bool {
        matches!(self, Self::PktLine(e) if e.is_invalid_length())
    }
}
