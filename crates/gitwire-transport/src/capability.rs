//! Capabilities the client side does not implement.

use gitwire_protocol::{Capability, CapabilityList};

/// Capabilities removed from every client request.
///
/// Negotiation here is single-round with `done`, and thin packs would need
/// the local object store to complete.
pub const UNSUPPORTED_CAPABILITIES: [Capability; 3] = [
    Capability::MultiAck,
    Capability::MultiAckDetailed,
    Capability::ThinPack,
];

/// Removes the capabilities this client cannot honour.
pub fn filter_unsupported_capabilities(caps: &mut CapabilityList) {
    for cap in &UNSUPPORTED_CAPABILITIES {
        caps.delete(cap);
    }
}
