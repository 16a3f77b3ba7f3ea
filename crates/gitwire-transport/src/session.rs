//! Upload-pack and receive-pack sessions over an established stream.

use crate::endpoint::Endpoint;
use crate::transport::Stream;
use crate::{Result, TransportError};
use gitwire_pktline::{PeekReader, PktLineWriter};
use gitwire_protocol::{
    AdvRefs, Capability, CapabilityList, Demuxer, NegotiationMode, ObjectId, ProtocolError,
    ReferenceUpdateRequest, ReportStatus, ServerResponse, SideBandKind, UploadPackRequest,
};
use std::io::{self, Read, Write};

type Reader = PeekReader<Box<dyn Stream>>;

/// State shared by both session kinds.
struct Connection {
    endpoint: Endpoint,
    reader: Reader,
    adv_refs: Option<AdvRefs>,
    requested: bool,
}

impl Connection {
    fn new(endpoint: Endpoint, stream: Box<dyn Stream>) -> Self {
        Self {
            endpoint,
            reader: PeekReader::new(stream),
            adv_refs: None,
            requested: false,
        }
    }

    fn advertised_references(&mut self) -> Result<&AdvRefs> {
        let adv = match self.adv_refs.take() {
            Some(adv) => adv,
            None => {
                let adv =
                    AdvRefs::decode(&mut self.reader).map_err(TransportError::from_remote)?;
                tracing::debug!(
                    endpoint = %self.endpoint,
                    refs = adv.references.len(),
                    capabilities = %adv.capabilities,
                    "received reference advertisement"
                );
                adv
            }
        };
        Ok(self.adv_refs.insert(adv))
    }

    /// Fails if `requested` asks for something the server did not advertise.
    fn check_capabilities(&mut self, requested: &CapabilityList) -> Result<()> {
        let advertised = &self.advertised_references()?.capabilities;
        for cap in requested.iter() {
            // The agent is informational and never needs to be advertised.
            if *cap != Capability::Agent && !advertised.supports(cap) {
                return Err(TransportError::UnsupportedCapability(cap.to_string()));
            }
        }
        Ok(())
    }

    fn writer(&mut self) -> &mut Box<dyn Stream> {
        self.reader.get_mut()
    }

    fn close(&mut self) -> Result<()> {
        if !self.requested {
            let mut pkt_writer = PktLineWriter::new(self.writer());
            pkt_writer.flush_pkt().map_err(ProtocolError::from)?;
            pkt_writer.flush().map_err(ProtocolError::from)?;
        }
        tracing::debug!(endpoint = %self.endpoint, "closed session");
        Ok(())
    }
}

/// A fetch conversation with `git-upload-pack`.
pub struct UploadPackSession {
    conn: Connection,
}

impl UploadPackSession {
    pub(crate) fn new(endpoint: Endpoint, stream: Box<dyn Stream>) -> Self {
        Self {
            conn: Connection::new(endpoint, stream),
        }
    }

    /// The endpoint this session talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.conn.endpoint
    }

    /// Reads the server's reference advertisement, once.
    ///
    /// Fails with [`TransportError::EmptyRemoteRepository`] when the remote
    /// has no references, since there is nothing to fetch.
    pub fn advertised_references(&mut self) -> Result<&AdvRefs> {
        let adv = self.conn.advertised_references()?;
        if adv.is_empty() {
            return Err(TransportError::EmptyRemoteRepository);
        }
        Ok(adv)
    }

    /// Sends the request and reads the negotiation result.
    ///
    /// The returned response reads the packfile; with side-band it yields
    /// only channel 1 data.
    pub fn upload_pack(&mut self, req: &UploadPackRequest) -> Result<UploadPackResponse<'_>> {
        if req.is_empty() {
            return Err(TransportError::EmptyUploadPackRequest);
        }
        self.advertised_references()?;
        self.conn.check_capabilities(&req.request.capabilities)?;

        req.encode(self.conn.writer())?;
        self.conn.writer().flush()?;
        self.conn.requested = true;

        let caps = &req.request.capabilities;
        let mode = NegotiationMode::from_capabilities(caps);
        let server_response = ServerResponse::decode(&mut self.conn.reader, mode.is_multi_ack())
            .map_err(TransportError::from_remote)?;
        tracing::debug!(
            endpoint = %self.conn.endpoint,
            wants = req.request.wants.len(),
            haves = req.haves.haves.len(),
            acks = server_response.acks.len(),
            "negotiation finished"
        );

        let body = match SideBandKind::from_capabilities(caps) {
            Some(_) => Body::SideBand(Demuxer::new(&mut self.conn.reader)),
            None => Body::Plain(&mut self.conn.reader),
        };
        Ok(UploadPackResponse {
            server_response,
            body,
        })
    }

    /// Ends the session, telling the server no request follows if none was sent.
    pub fn close(mut self) -> Result<()> {
        self.conn.close()
    }
}

enum Body<'a> {
    Plain(&'a mut Reader),
    SideBand(Demuxer<&'a mut Reader>),
}

/// The outcome of an upload-pack request: acknowledgments plus the packfile.
pub struct UploadPackResponse<'a> {
    server_response: ServerResponse,
    body: Body<'a>,
}

impl UploadPackResponse<'_> {
    /// Hashes the server acknowledged.
    pub fn acks(&self) -> &[ObjectId] {
        &self.server_response.acks
    }

    /// The decoded server response.
    pub fn server_response(&self) -> &ServerResponse {
        &self.server_response
    }

    /// Forwards side-band progress to `progress` instead of the log.
    pub fn with_progress(mut self, progress: Box<dyn Write + Send>) -> Self {
        self.body = match self.body {
            Body::SideBand(demux) => Body::SideBand(demux.with_progress(progress)),
            plain => plain,
        };
        self
    }
}

impl Read for UploadPackResponse<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.body {
            Body::Plain(reader) => reader.read(buf),
            Body::SideBand(demux) => demux.read(buf),
        }
    }
}

/// A push conversation with `git-receive-pack`.
pub struct ReceivePackSession {
    conn: Connection,
}

impl ReceivePackSession {
    pub(crate) fn new(endpoint: Endpoint, stream: Box<dyn Stream>) -> Self {
        Self {
            conn: Connection::new(endpoint, stream),
        }
    }

    /// The endpoint this session talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.conn.endpoint
    }

    /// Reads the server's reference advertisement, once.
    ///
    /// An empty repository is a valid push target.
    pub fn advertised_references(&mut self) -> Result<&AdvRefs> {
        self.conn.advertised_references()
    }

    /// Sends the ref updates and the pack, then reads the status report.
    ///
    /// Returns `None` when `report-status` was not requested. A report with a
    /// failed unpack or a rejected ref is returned as an error.
    pub fn receive_pack(
        &mut self,
        req: &ReferenceUpdateRequest,
        pack: &mut dyn Read,
    ) -> Result<Option<ReportStatus>> {
        self.conn.advertised_references()?;
        self.conn.check_capabilities(&req.capabilities)?;

        req.encode(self.conn.writer())?;
        if !req.is_delete_only() {
            let sent = io::copy(pack, self.conn.writer())?;
            tracing::debug!(bytes = sent, "sent pack");
        }
        self.conn.writer().flush()?;
        self.conn.requested = true;

        if !req.capabilities.supports(&Capability::ReportStatus) {
            return Ok(None);
        }

        let report = match SideBandKind::from_capabilities(&req.capabilities) {
            Some(_) => ReportStatus::decode(&mut Demuxer::new(&mut self.conn.reader)),
            None => ReportStatus::decode(&mut self.conn.reader),
        }
        .map_err(TransportError::from_remote)?;

        for cmd in report.commands.iter().filter(|c| !c.is_ok()) {
            tracing::warn!(reference = %cmd.reference, reason = %cmd.status, "ref update rejected");
        }
        report.error()?;
        Ok(Some(report))
    }

    /// Ends the session, telling the server no commands follow if none were sent.
    pub fn close(mut self) -> Result<()> {
        self.conn.close()
    }
}
