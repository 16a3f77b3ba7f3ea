//! Transport error types.

use crate::endpoint::Protocol;
use gitwire_pktline::PktLineError;
use gitwire_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur while parsing a repository address.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The address looks like a URL but cannot be parsed as one.
    #[error("invalid URL {0:?}")]
    InvalidUrl(String),

    /// The URL scheme is not one of http, https, ssh, git or file.
    #[error("unsupported protocol {0:?}")]
    UnsupportedProtocol(String),

    /// A port that does not fit in 16 bits.
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    /// The proxy URL cannot be parsed.
    #[error("invalid proxy URL {0:?}")]
    InvalidProxy(String),

    /// The working directory could not be read to resolve a relative path.
    #[error("cannot resolve working directory: {0}")]
    WorkingDir(std::io::Error),
}

/// Errors that can occur while talking to a remote.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Bad address or proxy settings.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// The peer sent something the protocol layer rejected.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// No transport is registered for the protocol.
    #[error("no transport registered for protocol {0}")]
    UnsupportedProtocol(Protocol),

    /// An upload-pack request without wants.
    #[error("empty upload-pack request")]
    EmptyUploadPackRequest,

    /// The remote repository has no references to fetch.
    #[error("remote repository is empty")]
    EmptyRemoteRepository,

    /// A capability was requested that the server did not advertise.
    #[error("server does not support capability {0:?}")]
    UnsupportedCapability(String),

    /// The remote asked for credentials.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The remote reported that the repository does not exist.
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Classifies a protocol error, turning well-known remote messages into
    /// their dedicated variants.
    pub(crate) fn from_remote(err: ProtocolError) -> Self {
        let err = unwrap_side_band_error(err);
        let ProtocolError::RemoteError(msg) = &err else {
            return Self::Protocol(err);
        };
        let lower = msg.to_ascii_lowercase();
        if lower.contains("not found")
            || lower.contains("does not appear to be a git repository")
            || lower.contains("no such repository")
            || lower.contains("not exported")
        {
            Self::RepositoryNotFound(msg.clone())
        } else if lower.contains("authentication") || lower.contains("access denied") {
            Self::AuthenticationRequired
        } else {
            Self::Protocol(err)
        }
    }
}

/// Side-band error frames reach pkt-line decoders as I/O errors.
fn unwrap_side_band_error(err: ProtocolError) -> ProtocolError {
    let io_err = match err {
        ProtocolError::Io(e) | ProtocolError::PktLine(PktLineError::Io(e)) => e,
        other => return other,
    };
    let inner = io_err
        .get_ref()
        .and_then(|e| e.downcast_ref::<ProtocolError>());
    if let Some(ProtocolError::RemoteError(msg)) = inner {
        return ProtocolError::RemoteError(msg.clone());
    }
    ProtocolError::Io(io_err)
}
