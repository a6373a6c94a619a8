//! BSD-style error codes returned at the socket-API boundary.

/// Negative-integer error codes matching the subset required by the BSD
/// socket surface. `TryFrom<i32>`/`From<Errno>` let callers that need the
/// raw ABI value cross at the edge; the rest of the crate returns
/// `Result<T, Errno>` rather than raw negatives.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    Error = -1,
    Sock = -2,
    Inval = -3,
    WouldBlock = -4,
    NoMem = -5,
    NotConn = -6,
    Locked = -7,
    TimedOut = -8,
    InProgress = -9,
    HostNotFound = -10,
    NotSup = -11,
    IsConn = -12,
    ConnRefused = -13,
    ConnReset = -14,
    ConnAborted = -15,
    Already = -16,
    AddrInUse = -17,
    DestAddrReq = -18,
    MsgSize = -19,
}

impl Errno {
    /// The raw ABI value, as returned by a C-shaped entry point.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl core::fmt::Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let s = match self {
            Errno::Error => "generic error",
            Errno::Sock => "invalid socket descriptor",
            Errno::Inval => "invalid argument",
            Errno::WouldBlock => "operation would block",
            Errno::NoMem => "out of memory",
            Errno::NotConn => "socket not connected",
            Errno::Locked => "resource locked",
            Errno::TimedOut => "operation timed out",
            Errno::InProgress => "operation in progress",
            Errno::HostNotFound => "host not found",
            Errno::NotSup => "operation not supported",
            Errno::IsConn => "socket already connected",
            Errno::ConnRefused => "connection refused",
            Errno::ConnReset => "connection reset by peer",
            Errno::ConnAborted => "connection aborted",
            Errno::Already => "operation already in progress",
            Errno::AddrInUse => "address already in use",
            Errno::DestAddrReq => "destination address required",
            Errno::MsgSize => "message too large",
        };
        f.write_str(s)
    }
}

impl std::error::Error for Errno {}

impl TryFrom<i32> for Errno {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, ()> {
        use Errno::*;
        Ok(match value {
            -1 => Error,
            -2 => Sock,
            -3 => Inval,
            -4 => WouldBlock,
            -5 => NoMem,
            -6 => NotConn,
            -7 => Locked,
            -8 => TimedOut,
            -9 => InProgress,
            -10 => HostNotFound,
            -11 => NotSup,
            -12 => IsConn,
            -13 => ConnRefused,
            -14 => ConnReset,
            -15 => ConnAborted,
            -16 => Already,
            -17 => AddrInUse,
            -18 => DestAddrReq,
            -19 => MsgSize,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trips_through_try_from() {
        for e in [
            Errno::Error,
            Errno::WouldBlock,
            Errno::ConnRefused,
            Errno::MsgSize,
        ] {
            assert_eq!(Errno::try_from(e.code()), Ok(e));
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(Errno::try_from(1), Err(()));
        assert_eq!(Errno::try_from(0), Err(()));
    }
}
