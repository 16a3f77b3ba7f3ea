//! Transport lookup by protocol.

use crate::endpoint::{Endpoint, Protocol};
use crate::session::{ReceivePackSession, UploadPackSession};
use crate::transport::{GitDaemonTransport, PipeTransport, SmartHttpTransport, Stream, Transport};
use crate::{Result, TransportError};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps each protocol to the transport that serves it.
///
/// Build one at startup and pass it to whatever opens sessions.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<Protocol, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in transports for every protocol.
    pub fn with_defaults() -> Self {
        let http: Arc<dyn Transport> = Arc::new(SmartHttpTransport);
        let pipe: Arc<dyn Transport> = Arc::new(PipeTransport::default());

        let mut registry = Self::new();
        registry.register(Protocol::Http, Arc::clone(&http));
        registry.register(Protocol::Https, http);
        registry.register(Protocol::Ssh, Arc::clone(&pipe));
        registry.register(Protocol::File, pipe);
        registry.register(Protocol::Git, Arc::new(GitDaemonTransport));
        registry
    }

    /// Registers a transport, replacing any previous one for the protocol.
    pub fn register(&mut self, protocol: Protocol, transport: Arc<dyn Transport>) {
        tracing::debug!(%protocol, transport = transport.name(), "registered transport");
        self.transports.insert(protocol, transport);
    }

    /// Removes the transport for a protocol.
    pub fn unregister(&mut self, protocol: Protocol) -> Option<Arc<dyn Transport>> {
        self.transports.remove(&protocol)
    }

    /// Returns the transport for a protocol.
    pub fn get(&self, protocol: Protocol) -> Result<Arc<dyn Transport>> {
        self.transports
            .get(&protocol)
            .cloned()
            .ok_or(TransportError::UnsupportedProtocol(protocol))
    }

    /// Returns the transport for an endpoint's protocol.
    pub fn for_endpoint(&self, endpoint: &Endpoint) -> Result<Arc<dyn Transport>> {
        self.get(endpoint.protocol)
    }

    /// Opens a fetch session with the endpoint's transport.
    pub fn open_upload_pack(
        &self,
        endpoint: &Endpoint,
        stream: Box<dyn Stream>,
    ) -> Result<UploadPackSession> {
        self.for_endpoint(endpoint)?
            .new_upload_pack_session(endpoint, stream)
    }

    /// Opens a push session with the endpoint's transport.
    pub fn open_receive_pack(
        &self,
        endpoint: &Endpoint,
        stream: Box<dyn Stream>,
    ) -> Result<ReceivePackSession> {
        self.for_endpoint(endpoint)?
            .new_receive_pack_session(endpoint, stream)
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self
            .transports
            .iter()
            .map(|(p, t)| (p.as_str(), t.name()))
            .collect();
        names.sort_unstable();
        f.debug_struct("TransportRegistry")
            .field("transports", &names)
            .finish()
    }
}
