//! IP fragmentation is out of scope (see the crate-level Non-goals): IPv4
//! datagrams larger than the device's IP MTU are dropped rather than split,
//! and incoming fragments are not reassembled. These two types remain as
//! the hook points `dispatch_ip`/`process_ethernet` already call into, so
//! that support could be added later without changing their signatures.

/// Reassembly state for incoming IP fragments. Always empty.
pub(crate) struct FragmentsBuffer {}

/// Outgoing fragmentation state. Always empty.
pub(crate) struct Fragmenter {}

impl Fragmenter {
    pub(crate) fn new() -> Self {
        Fragmenter {}
    }
}
