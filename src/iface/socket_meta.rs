use super::socket_set::SocketHandle;
use crate::socket::PollAt;
use crate::time::{Duration, Instant};
use crate::wire::IpAddress;

/// Discovery process for an address that is missing in the neighbor cache.
#[derive(Debug, Clone, Copy)]
struct NeighborState {
    addr: IpAddress,
    expires_at: Instant,
}

/// Per-socket state held outside of the socket itself: a stable handle, plus
/// bookkeeping for the egress-side neighbor discovery backoff.
///
/// Separate from the socket so that a socket implementation never needs to
/// know about its own handle or about link-layer address resolution.
#[derive(Debug)]
pub(crate) struct Meta {
    pub(crate) handle: SocketHandle,
    neighbor_state: Option<NeighborState>,
}

/// Backoff applied to a socket whose dispatch just failed to resolve a
/// neighbor, so the interface doesn't spin re-dispatching the same socket on
/// every poll while waiting for ARP/NDP to answer.
const DISCOVERY_RETRY_PERIOD: Duration = Duration::from_secs(1);

impl Meta {
    pub(crate) fn new(handle: SocketHandle) -> Self {
        Self {
            handle,
            neighbor_state: None,
        }
    }

    /// Whether this socket should currently be considered for egress
    /// dispatch, given the combined poll_at and neighbor cache state.
    pub(crate) fn egress_permitted(
        &self,
        timestamp: Instant,
        has_neighbor: impl FnOnce(&IpAddress) -> bool,
    ) -> bool {
        match self.neighbor_state {
            Some(NeighborState { addr, expires_at }) => has_neighbor(&addr) || timestamp >= expires_at,
            None => true,
        }
    }

    /// Record that egress failed because the neighbor for `neighbor_addr`
    /// is not yet resolved, and should not be retried until the backoff
    /// period elapses or the neighbor resolves.
    pub(crate) fn neighbor_missing(&mut self, timestamp: Instant, neighbor_addr: IpAddress) {
        self.neighbor_state = Some(NeighborState {
            addr: neighbor_addr,
            expires_at: timestamp + DISCOVERY_RETRY_PERIOD,
        });
    }

    /// Combine the socket's own scheduling hint with the neighbor discovery
    /// backoff, to compute when the interface should next dispatch this
    /// socket.
    pub(crate) fn poll_at(
        &self,
        socket_poll_at: PollAt,
        has_neighbor: impl FnOnce(&IpAddress) -> bool,
    ) -> PollAt {
        match self.neighbor_state {
            Some(NeighborState { addr, expires_at }) => {
                if has_neighbor(&addr) {
                    socket_poll_at
                } else {
                    PollAt::Time(expires_at)
                }
            }
            None => socket_poll_at,
        }
    }
}
