//! Fuzz target for repository address parsing.
//!
//! Parsing must never panic, and a parsed endpoint must serialize.

#![no_main]

use gitwire_transport::Endpoint;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(address) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(endpoint) = Endpoint::parse(address) {
        let _ = endpoint.to_string();
    }
});
