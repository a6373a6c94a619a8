//! Event codes posted to user-supplied socket callbacks.
//!
//! The original system invokes C function pointers from the core thread;
//! here that becomes a tagged enum so the core can push events without
//! taking a trait object's vtable on every socket. Callbacks run on the
//! core thread and must not block (see [`crate::bsd::core`]).

/// Events delivered to a TCP socket's callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpEvent {
    /// The active-open handshake completed (`SYN_Sent` -> `Established`).
    Connect,
    /// A passive-open handshake completed for an accepted child.
    Established,
    /// The connection finished a graceful close.
    Closed,
    /// The connection was reset or aborted.
    Aborted,
    /// An outstanding send was acknowledged.
    Ack,
    /// New bytes are available in the receive buffer.
    Data,
}

/// Events delivered to a UDP socket's callback (`UDP_Socket.c`-style
/// callback-only usage, with no FD attached).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpEvent {
    /// A datagram arrived and is available via the socket's receive queue.
    Data,
}
