//! Git smart protocol messages.
//!
//! This crate encodes and decodes the messages exchanged by git-upload-pack
//! and git-receive-pack on top of pkt-line framing: reference advertisements,
//! capability lists, want/have negotiation with its ACK/NAK responses,
//! ref update commands, status reports and side-band multiplexing.

mod advrefs;
mod capability;
mod error;
mod oid;
mod report;
mod sideband;
mod srvresp;
mod update;
mod upload;

pub use advrefs::AdvRefs;
pub use capability::{Capability, CapabilityList, DEFAULT_AGENT};
pub use error::ProtocolError;
pub use oid::{ObjectId, HEX_LEN};
pub use report::{CommandStatus, ReportStatus};
pub use sideband::{
    Channel, Demuxer, Muxer, SideBandKind, MAX_SIDE_BAND_64K_SIZE, MAX_SIDE_BAND_SIZE,
};
pub use srvresp::{
    write_server_response, AckRecord, NegotiationMode, ServerResponse, UploadPackCommand,
};
pub use update::{Action, Command, ReferenceUpdateRequest};
pub use upload::{Depth, UploadHaves, UploadPackRequest, UploadRequest};

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
