//! End-to-end sessions against a scripted server.

use gitwire_pktline::PktLineWriter;
use gitwire_protocol::{
    write_server_response, AckRecord, AdvRefs, Capability, CapabilityList, Channel, Command,
    CommandStatus, Muxer, NegotiationMode, ObjectId, ProtocolError, ReferenceUpdateRequest,
    ReportStatus, SideBandKind, UploadPackCommand, UploadPackRequest,
};
use gitwire_transport::{Endpoint, TransportError, TransportRegistry};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

const A: &str = "6ecf0ef2c2dffb796033e5a02219af86ec6584e5";
const B: &str = "1111111111111111111111111111111111111111";

const SERVER_CAPS: &[u8] =
    b"multi_ack ofs-delta side-band-64k report-status delete-refs agent=git/2.43.0";

fn oid(hex: &str) -> ObjectId {
    ObjectId::from_hex(hex).unwrap()
}

/// A stream that replays a canned server reply and records what the client sends.
struct Scripted {
    reply: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl Scripted {
    fn new(reply: Vec<u8>) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            reply: Cursor::new(reply),
            sent: Arc::clone(&sent),
        };
        (stream, sent)
    }
}

impl Read for Scripted {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reply.read(buf)
    }
}

impl Write for Scripted {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sent.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn advertisement() -> Vec<u8> {
    let mut adv = AdvRefs::new();
    adv.head = Some(oid(A));
    adv.references.insert("refs/heads/master".to_string(), oid(A));
    adv.capabilities = CapabilityList::decode(SERVER_CAPS).unwrap();
    let mut buf = Vec::new();
    adv.encode(&mut buf).unwrap();
    buf
}

fn fetch_request(caps: &[u8]) -> UploadPackRequest {
    let mut req = UploadPackRequest::new();
    req.request.wants = vec![oid(A)];
    req.request.capabilities = CapabilityList::decode(caps).unwrap();
    req
}

fn git_endpoint() -> Endpoint {
    Endpoint::parse("git://example.com/repo.git").unwrap()
}

#[test]
fn test_advertised_references_then_close() {
    let (stream, sent) = Scripted::new(advertisement());
    let registry = TransportRegistry::with_defaults();
    let mut session = registry
        .open_upload_pack(&git_endpoint(), Box::new(stream))
        .unwrap();

    let adv = session.advertised_references().unwrap();
    assert_eq!(adv.head, Some(oid(A)));
    assert_eq!(adv.references.get("refs/heads/master"), Some(&oid(A)));
    assert!(adv.capabilities.supports(&Capability::SideBand64k));

    // Cached: a second call must not read again.
    assert_eq!(session.advertised_references().unwrap().references.len(), 1);
    session.close().unwrap();

    let mut expected = b"002fgit-upload-pack /repo.git\0host=example.com\0".to_vec();
    expected.extend_from_slice(b"0000");
    assert_eq!(&*sent.lock(), &expected);
}

#[test]
fn test_upload_pack_plain() {
    let mut reply = advertisement();
    reply.extend_from_slice(b"0008NAK\n");
    reply.extend_from_slice(b"PACK\x00\x00\x00\x02\x00\x00\x00\x00");

    let (stream, sent) = Scripted::new(reply);
    let endpoint = Endpoint::parse("file:///srv/repo.git").unwrap();
    let mut session = TransportRegistry::with_defaults()
        .open_upload_pack(&endpoint, Box::new(stream))
        .unwrap();

    let req = fetch_request(b"ofs-delta");
    let mut response = session.upload_pack(&req).unwrap();
    assert!(response.acks().is_empty());

    let mut pack = Vec::new();
    response.read_to_end(&mut pack).unwrap();
    assert_eq!(pack, b"PACK\x00\x00\x00\x02\x00\x00\x00\x00");
    drop(response);

    let mut expected = Vec::new();
    req.encode(&mut expected).unwrap();
    assert_eq!(&*sent.lock(), &expected);
    session.close().unwrap();
    assert_eq!(&*sent.lock(), &expected, "close after a request sends nothing");
}

#[test]
fn test_upload_pack_side_band() {
    let mut reply = advertisement();
    write_server_response(
        &mut reply,
        NegotiationMode::MultiAck,
        &[UploadPackCommand {
            acks: vec![AckRecord::common(oid(B))],
            done: true,
        }],
    )
    .unwrap();

    let mut mux = Muxer::new(SideBandKind::SideBand64k, Vec::new());
    mux.write_channel(Channel::Progress, b"Counting objects: 1, done.\n")
        .unwrap();
    mux.write_channel(Channel::PackData, b"PACK").unwrap();
    mux.write_channel(Channel::PackData, b"\x00\x00\x00\x02").unwrap();
    mux.finish().unwrap();
    reply.extend(mux.into_inner());

    let (stream, _sent) = Scripted::new(reply);
    let mut session = TransportRegistry::with_defaults()
        .open_upload_pack(&git_endpoint(), Box::new(stream))
        .unwrap();

    let mut req = fetch_request(b"multi_ack side-band-64k ofs-delta");
    req.haves.haves = vec![oid(B)];
    let mut response = session.upload_pack(&req).unwrap();
    assert_eq!(response.acks(), &[oid(B), oid(B)]);

    let mut pack = Vec::new();
    response.read_to_end(&mut pack).unwrap();
    assert_eq!(pack, b"PACK\x00\x00\x00\x02");
}

#[test]
fn test_upload_pack_progress_writer() {
    #[derive(Clone, Default)]
    struct Progress(Arc<Mutex<Vec<u8>>>);

    impl Write for Progress {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let mut reply = advertisement();
    reply.extend_from_slice(b"0008NAK\n");
    let mut mux = Muxer::new(SideBandKind::SideBand64k, Vec::new());
    mux.write_channel(Channel::Progress, b"Total 3\n").unwrap();
    mux.write_channel(Channel::PackData, b"PACK").unwrap();
    mux.finish().unwrap();
    reply.extend(mux.into_inner());

    let (stream, _sent) = Scripted::new(reply);
    let mut session = TransportRegistry::with_defaults()
        .open_upload_pack(&git_endpoint(), Box::new(stream))
        .unwrap();

    let progress = Progress::default();
    let mut response = session
        .upload_pack(&fetch_request(b"side-band-64k"))
        .unwrap()
        .with_progress(Box::new(progress.clone()));
    let mut pack = Vec::new();
    response.read_to_end(&mut pack).unwrap();

    assert_eq!(pack, b"PACK");
    assert_eq!(&*progress.0.lock(), b"Total 3\n");
}

#[test]
fn test_upload_pack_rejects_empty_request() {
    let (stream, sent) = Scripted::new(advertisement());
    let mut session = TransportRegistry::with_defaults()
        .open_upload_pack(&git_endpoint(), Box::new(stream))
        .unwrap();
    sent.lock().clear();

    let err = session.upload_pack(&UploadPackRequest::new()).err().unwrap();
    assert!(matches!(err, TransportError::EmptyUploadPackRequest));
    assert!(sent.lock().is_empty());
}

#[test]
fn test_upload_pack_rejects_unadvertised_capability() {
    let (stream, _sent) = Scripted::new(advertisement());
    let mut session = TransportRegistry::with_defaults()
        .open_upload_pack(&git_endpoint(), Box::new(stream))
        .unwrap();

    let err = session
        .upload_pack(&fetch_request(b"no-done agent=gitwire/0.1.0"))
        .err()
        .unwrap();
    assert!(matches!(err, TransportError::UnsupportedCapability(cap) if cap == "no-done"));
}

#[test]
fn test_empty_remote_repository() {
    let mut adv = AdvRefs::new();
    adv.capabilities = CapabilityList::decode(b"ofs-delta").unwrap();
    let mut reply = Vec::new();
    adv.encode(&mut reply).unwrap();

    let (stream, _sent) = Scripted::new(reply);
    let mut session = TransportRegistry::with_defaults()
        .open_upload_pack(&git_endpoint(), Box::new(stream))
        .unwrap();
    assert!(matches!(
        session.advertised_references(),
        Err(TransportError::EmptyRemoteRepository)
    ));
}

#[test]
fn test_repository_not_found() {
    let mut reply = Vec::new();
    PktLineWriter::new(&mut reply)
        .write_line("ERR repository not found")
        .unwrap();

    let (stream, _sent) = Scripted::new(reply);
    let mut session = TransportRegistry::with_defaults()
        .open_upload_pack(&git_endpoint(), Box::new(stream))
        .unwrap();
    assert!(matches!(
        session.advertised_references(),
        Err(TransportError::RepositoryNotFound(_))
    ));
}

fn push_request(caps: &[u8]) -> ReferenceUpdateRequest {
    let mut req = ReferenceUpdateRequest::new();
    req.capabilities = CapabilityList::decode(caps).unwrap();
    req.commands = vec![Command::new("refs/heads/master", oid(A), oid(B))];
    req
}

#[test]
fn test_receive_pack_report_status() {
    let mut reply = advertisement();
    let mut report = ReportStatus::new();
    report.commands = vec![CommandStatus::ok("refs/heads/master")];
    report.encode(&mut reply).unwrap();

    let (stream, sent) = Scripted::new(reply);
    let mut session = TransportRegistry::with_defaults()
        .open_receive_pack(&git_endpoint(), Box::new(stream))
        .unwrap();
    sent.lock().clear();

    let req = push_request(b"report-status");
    let got = session
        .receive_pack(&req, &mut &b"PACKDATA"[..])
        .unwrap()
        .unwrap();
    assert_eq!(got, report);

    let mut expected = Vec::new();
    req.encode(&mut expected).unwrap();
    expected.extend_from_slice(b"PACKDATA");
    assert_eq!(&*sent.lock(), &expected);
}

#[test]
fn test_receive_pack_side_band_rejection() {
    let mut report = ReportStatus::new();
    report.commands = vec![CommandStatus::rejected("refs/heads/master", "non-fast-forward")];
    let mut inner = Vec::new();
    report.encode(&mut inner).unwrap();

    let mut reply = advertisement();
    let mut mux = Muxer::new(SideBandKind::SideBand64k, Vec::new());
    mux.write_channel(Channel::PackData, &inner).unwrap();
    mux.finish().unwrap();
    reply.extend(mux.into_inner());

    let (stream, _sent) = Scripted::new(reply);
    let mut session = TransportRegistry::with_defaults()
        .open_receive_pack(&git_endpoint(), Box::new(stream))
        .unwrap();

    let err = session
        .receive_pack(&push_request(b"report-status side-band-64k"), &mut &b"PACK"[..])
        .unwrap_err();
    match err {
        TransportError::Protocol(ProtocolError::RemoteError(msg)) => {
            assert!(msg.contains("non-fast-forward"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_receive_pack_without_report_and_delete_only() {
    let (stream, sent) = Scripted::new(advertisement());
    let mut session = TransportRegistry::with_defaults()
        .open_receive_pack(&git_endpoint(), Box::new(stream))
        .unwrap();
    sent.lock().clear();

    let mut req = ReferenceUpdateRequest::new();
    req.capabilities = CapabilityList::decode(b"delete-refs").unwrap();
    req.commands = vec![Command::new("refs/heads/old", oid(A), ObjectId::ZERO)];

    let got = session
        .receive_pack(&req, &mut &b"never sent"[..])
        .unwrap();
    assert!(got.is_none());

    let mut expected = Vec::new();
    req.encode(&mut expected).unwrap();
    assert_eq!(&*sent.lock(), &expected);
}

#[test]
fn test_receive_pack_accepts_empty_repository() {
    let mut adv = AdvRefs::new();
    adv.capabilities = CapabilityList::decode(b"report-status delete-refs").unwrap();
    let mut reply = Vec::new();
    adv.encode(&mut reply).unwrap();

    let (stream, _sent) = Scripted::new(reply);
    let mut session = TransportRegistry::with_defaults()
        .open_receive_pack(&git_endpoint(), Box::new(stream))
        .unwrap();
    let adv = session.advertised_references().unwrap();
    assert!(adv.is_empty());
    assert!(adv.capabilities.supports(&Capability::ReportStatus));
}
