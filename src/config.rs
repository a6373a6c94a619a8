//! Build-time configuration constants.
//!
//! Per spec: "Configuration surface. Build-time constants only ... No
//! runtime configuration files." Everything here is a `pub const`; there is
//! no config file format and nothing here is read from the environment.

/// Number of TCP control blocks in the fixed pool.
pub const TCP_SOCKET_COUNT: usize = 16;

/// Number of UDP control blocks in the fixed pool.
pub const UDP_SOCKET_COUNT: usize = 16;

/// Number of entries in the BSD FD table (also `FD_SETSIZE`).
pub const FD_TABLE_SIZE: usize = 64;

/// `FD_SETSIZE` used by `select`'s fixed-size bitmap.
pub const FD_SETSIZE: usize = FD_TABLE_SIZE;

/// Maximum number of half-open + ready connections held per listening socket.
pub const TCP_LISTEN_BACKLOG: usize = 4;

/// Default TCP receive window, in bytes, before scaling.
pub const TCP_DEFAULT_RX_BUFFER_SIZE: usize = 8192;
pub const TCP_DEFAULT_TX_BUFFER_SIZE: usize = 8192;

/// Per-socket UDP receive queue depth (datagrams, not bytes).
pub const UDP_RX_QUEUE_DEPTH: usize = 8;
pub const UDP_RX_PAYLOAD_CAPACITY: usize = 2048;

/// Maximum Segment Lifetime. TIME_WAIT = 2 * MSL by default (spec §4.4.8).
pub const MSL: crate::time::Duration = crate::time::Duration::from_secs(60);

/// Embedded profile override: pass `time_wait_factor = 1` to halve TIME_WAIT,
/// matching the spec's "MAY shorten to 1*MSL for embedded profiles".
pub const TIME_WAIT_FACTOR_DEFAULT: u32 = 2;

/// RTO bounds (spec §4.4.4): floored at 1s, ceiled at 60s.
pub const RTO_MIN: crate::time::Duration = crate::time::Duration::from_secs(1);
pub const RTO_MAX: crate::time::Duration = crate::time::Duration::from_secs(60);
pub const RTO_INITIAL: crate::time::Duration = crate::time::Duration::from_millis(1000);

/// Number of consecutive retransmissions of the same segment before abort.
pub const TCP_MAX_RETRANSMISSIONS: u8 = 8;

/// Delayed-ACK timer (spec §4.4.5: "schedule an ACK 200ms after...").
pub const TCP_DELAYED_ACK_TIMEOUT: crate::time::Duration = crate::time::Duration::from_millis(200);

/// Keepalive defaults (spec §4.4.6, `TCP_KEEPIDLE`).
pub const TCP_KEEPALIVE_IDLE_DEFAULT: crate::time::Duration = crate::time::Duration::from_secs(7200);
pub const TCP_KEEPALIVE_INTERVAL: crate::time::Duration = crate::time::Duration::from_secs(75);
pub const TCP_KEEPALIVE_MAX_PROBES: u8 = 9;

/// Connect (SYN_SENT) timeout budget before `ETIMEDOUT`.
pub const TCP_CONNECT_TIMEOUT: crate::time::Duration = crate::time::Duration::from_secs(75);

/// Core timer wheel tick (spec §2, §4.1: "nominally 100 ms").
pub const TIMER_TICK: crate::time::Duration = crate::time::Duration::from_millis(100);

/// Default MSS when the peer's SYN carries none.
pub const TCP_DEFAULT_MSS: usize = 536;

/// Default IPv4 interface MTU used when a device doesn't report one.
pub const DEFAULT_MTU: usize = 1500;

/// Capacity of the interface routing table.
pub const IFACE_MAX_ROUTE_COUNT: usize = 4;

/// Capacity of the interface neighbor (ARP/NDP) cache.
pub const IFACE_NEIGHBOR_CACHE_COUNT: usize = 8;

/// Capacity of the interface's bound IP address list.
pub const IFACE_MAX_ADDR_COUNT: usize = 4;

/// Bounded UDP/raw-frame ingress queue the core thread drains per poll.
pub const RX_QUEUE_DEPTH: usize = 32;
