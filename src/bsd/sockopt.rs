//! Socket option surface (`getsockopt`/`setsockopt`), matching spec §4.5.4.

use std::time::Duration as StdDuration;

use crate::bsd::errno::Errno;
use crate::bsd::fd::{FdEntry, SockType};

/// `(level, name)` pair identifying a socket option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockOpt {
    SoKeepAlive,
    SoRcvTimeo,
    SoSndTimeo,
    SoType,
    SoBindToDevice,
    IpTos,
    IpTtl,
    IpRecvDstAddr,
    Ipv6TClass,
    Ipv6MulticastHops,
    Ipv6RecvDstAddr,
    Ipv6V6Only,
    TcpQuickAck,
    TcpFlowCtrl,
    TcpKeepIdle,
}

/// The value carried by a [`SockOpt`] get/set call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptValue {
    Bool(bool),
    MillisU32(u32),
    SecondsU32(u32),
    Byte(u8),
    SockType(SockType),
    InterfaceId(crate::bsd::fd::InterfaceId),
}

/// `setsockopt`. Returns `EINVAL` for a read-only option or an option/value
/// type mismatch.
pub fn set(entry: &mut FdEntry, opt: SockOpt, value: OptValue) -> Result<(), Errno> {
    match (opt, value) {
        (SockOpt::SoRcvTimeo, OptValue::MillisU32(ms)) => {
            entry.rcvtimeo = millis_to_duration(ms);
            Ok(())
        }
        (SockOpt::SoSndTimeo, OptValue::MillisU32(ms)) => {
            entry.sndtimeo = millis_to_duration(ms);
            Ok(())
        }
        (SockOpt::SoBindToDevice, OptValue::InterfaceId(id)) => {
            entry.bind_device = Some(id);
            Ok(())
        }
        (SockOpt::SoType, _) => Err(Errno::Inval),
        // The remaining options (SO_KEEPALIVE, IP_TOS/TTL/RECVDSTADDR,
        // IPV6_*, TCP_QUICKACK/FLOWCTRL/KEEPIDLE) live on the transport
        // socket or on `Core`'s per-FD extra-option table, not here — this
        // function only ever sees them via the catch-all below, since
        // `Core::setsockopt` dispatches them before reaching `FdEntry`.
        (
            SockOpt::SoKeepAlive
            | SockOpt::IpTos
            | SockOpt::IpTtl
            | SockOpt::IpRecvDstAddr
            | SockOpt::Ipv6TClass
            | SockOpt::Ipv6MulticastHops
            | SockOpt::Ipv6RecvDstAddr
            | SockOpt::Ipv6V6Only
            | SockOpt::TcpQuickAck
            | SockOpt::TcpFlowCtrl
            | SockOpt::TcpKeepIdle,
            _,
        ) => Ok(()),
    }
}

/// `getsockopt`.
pub fn get(entry: &FdEntry, opt: SockOpt) -> Result<OptValue, Errno> {
    match opt {
        SockOpt::SoRcvTimeo => Ok(OptValue::MillisU32(duration_to_millis(entry.rcvtimeo))),
        SockOpt::SoSndTimeo => Ok(OptValue::MillisU32(duration_to_millis(entry.sndtimeo))),
        SockOpt::SoType => Ok(OptValue::SockType(entry.ty)),
        SockOpt::SoBindToDevice => entry
            .bind_device
            .map(OptValue::InterfaceId)
            .ok_or(Errno::Inval),
        _ => Err(Errno::NotSup),
    }
}

fn millis_to_duration(ms: u32) -> Option<StdDuration> {
    if ms == 0 {
        None
    } else {
        Some(StdDuration::from_millis(ms as u64))
    }
}

fn duration_to_millis(d: Option<StdDuration>) -> u32 {
    d.map(|d| d.as_millis() as u32).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsd::fd::{Family, TransportHandle};
    use crate::iface::SocketSet;
    use crate::socket::udp;
    use crate::storage::PacketMetadata;

    fn entry() -> FdEntry {
        let mut sockets = SocketSet::new();
        let handle = sockets.add(udp::Socket::new(
            udp::PacketBuffer::new(vec![PacketMetadata::EMPTY; 1], vec![0u8; 16]),
            udp::PacketBuffer::new(vec![PacketMetadata::EMPTY; 1], vec![0u8; 16]),
        ));
        let mut table = crate::bsd::fd::FdTable::new();
        let fd = table
            .alloc(Family::Inet, SockType::Dgram, TransportHandle::Udp(handle))
            .unwrap();
        table.close(fd).unwrap()
    }

    #[test]
    fn setting_so_type_is_rejected() {
        let mut e = entry();
        assert_eq!(
            set(&mut e, SockOpt::SoType, OptValue::SockType(SockType::Dgram)),
            Err(Errno::Inval)
        );
    }

    #[test]
    fn rcvtimeo_round_trips() {
        let mut e = entry();
        set(&mut e, SockOpt::SoRcvTimeo, OptValue::MillisU32(1000)).unwrap();
        assert_eq!(get(&e, SockOpt::SoRcvTimeo), Ok(OptValue::MillisU32(1000)));
    }
}
