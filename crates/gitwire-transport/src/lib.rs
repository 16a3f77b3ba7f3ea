//! Git transports: repository addresses, transport dispatch and sessions.
//!
//! [`Endpoint`] parses every address form git accepts. A
//! [`TransportRegistry`] maps the endpoint's protocol to a [`Transport`],
//! which turns a caller-supplied byte stream into an [`UploadPackSession`]
//! or a [`ReceivePackSession`].
//!
//! ```no_run
//! use gitwire_transport::{Endpoint, TransportRegistry};
//! use std::net::TcpStream;
//!
//! let endpoint = Endpoint::parse("git://example.com/repo.git")?;
//! let stream = TcpStream::connect(("example.com", 9418))?;
//! let registry = TransportRegistry::with_defaults();
//! let mut session = registry.open_upload_pack(&endpoint, Box::new(stream))?;
//! for (name, id) in &session.advertised_references()?.references {
//!     println!("{id}\t{name}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod capability;
mod endpoint;
mod error;
mod registry;
mod session;
mod transport;

pub use capability::{filter_unsupported_capabilities, UNSUPPORTED_CAPABILITIES};
pub use endpoint::{Endpoint, Protocol, ProxyOptions};
pub use error::{EndpointError, TransportError};
pub use registry::TransportRegistry;
pub use session::{ReceivePackSession, UploadPackResponse, UploadPackSession};
pub use transport::{
    GitDaemonTransport, PipeTransport, Service, SmartHttpTransport, Stream, Transport,
};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
