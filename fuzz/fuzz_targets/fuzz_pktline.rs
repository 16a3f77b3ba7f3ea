//! Fuzz target for pkt-line framing.
//!
//! Any input must either decode or fail cleanly, and every decoded line must
//! re-encode to the bytes it came from.

#![no_main]

use gitwire_pktline::{PktLine, PktLineReader};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let mut reader = PktLineReader::new(Cursor::new(data));
    let mut consumed = 0usize;

    // Bounded so crafted input cannot spin forever on empty lines.
    for _ in 0..1000 {
        match reader.read() {
            Ok(Some(pkt)) => {
                let Ok(encoded) = pkt.encode() else {
                    // Oversized lines are tolerated on read but never written.
                    break;
                };
                let end = consumed + encoded.len();
                if matches!(pkt, PktLine::Data(_)) {
                    // The header may have been uppercase on the wire.
                    assert!(data[consumed..end][4..] == encoded[4..]);
                } else {
                    assert_eq!(&data[consumed..end], b"0000");
                }
                consumed = end;
            }
            Ok(None) | Err(_) => break,
        }
    }
});
