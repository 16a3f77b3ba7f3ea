//! Git pkt-line framing codec.
//!
//! Every message of the git smart protocol rides on pkt-lines: a 4-digit hex
//! length (which counts itself) followed by the payload, or the `0000` flush
//! marker that closes a section of the conversation.

mod error;
mod peek;
mod pktline;

pub use error::PktLineError;
pub use peek::{Peek, PeekReader};
pub use pktline::{PktLine, PktLineReader, PktLineWriter};

/// Result type for pkt-line operations.
pub type Result<T> = std::result::Result<T, PktLineError>;

/// Size of the hex length header.
pub const LEN_HEADER_SIZE: usize = 4;

/// Largest payload a conforming peer sends in one pkt-line.
pub const MAX_PAYLOAD_SIZE: usize = 65516;

/// Largest total pkt-line size a conforming peer sends.
pub const MAX_PACKET_SIZE: usize = MAX_PAYLOAD_SIZE + LEN_HEADER_SIZE;

/// Largest length the 4-digit header can express.
pub const MAX_ENCODED_LEN: usize = 0xffff;

/// The flush marker.
pub const FLUSH: &[u8; 4] = b"0000";
