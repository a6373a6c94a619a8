//! TLS collaborator interface (spec §6: "the core provides a byte-stream
//! socket and is unaware of TLS internals"). No TLS or crypto code lives
//! here; `StreamSocket` is just the marker a TLS layer would wrap.

/// Implemented by the BSD TCP socket handle. A TLS collaborator takes a
/// `StreamSocket` and layers a handshake and record protocol over its
/// `send`/`recv` calls; this crate has no opinion on what that is.
pub trait StreamSocket {
    fn send(&mut self, data: &[u8]) -> Result<usize, crate::bsd::errno::Errno>;
    fn recv(&mut self, data: &mut [u8]) -> Result<usize, crate::bsd::errno::Errno>;
}
