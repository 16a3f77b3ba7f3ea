//! Fuzz target for git protocol message decoding.
//!
//! Feeds the same bytes to every decoder a client or server runs on
//! untrusted input.

#![no_main]

use gitwire_protocol::{
    AdvRefs, Demuxer, ReferenceUpdateRequest, ReportStatus, UploadHaves, UploadRequest,
};
use libfuzzer_sys::fuzz_target;
use std::io::{Cursor, Read};

fuzz_target!(|data: &[u8]| {
    if let Ok(adv) = AdvRefs::decode(&mut Cursor::new(data)) {
        let mut buf = Vec::new();
        let _ = adv.encode(&mut buf);
    }

    let _ = UploadRequest::decode(&mut Cursor::new(data));
    let _ = UploadHaves::decode(&mut Cursor::new(data));
    let _ = ReferenceUpdateRequest::decode(&mut Cursor::new(data));
    let _ = ReportStatus::decode(&mut Cursor::new(data));

    let mut out = Vec::new();
    let _ = Demuxer::new(Cursor::new(data)).read_to_end(&mut out);
});
