//! Fuzz target for ACK/NAK response decoding.

#![no_main]

use gitwire_pktline::PeekReader;
use gitwire_protocol::ServerResponse;
use libfuzzer_sys::fuzz_target;
use std::io::Read;

fuzz_target!(|data: &[u8]| {
    let Some((&flag, rest)) = data.split_first() else {
        return;
    };
    let mut reader = PeekReader::new(rest);
    if ServerResponse::decode(&mut reader, flag & 1 == 1).is_ok() {
        // Whatever follows the response must still be readable.
        let mut tail = Vec::new();
        let _ = reader.read_to_end(&mut tail);
    }
});
