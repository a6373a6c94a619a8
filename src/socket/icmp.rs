//! ICMP sockets: userspace access to ICMP echo replies and error messages,
//! for building tools like `ping` without a dedicated kernel facility.

use core::cmp;

use crate::iface::InterfaceInner;
use crate::storage::{Empty, Full};
use crate::wire::{
    IcmpRepr, Icmpv4Packet, Icmpv4Repr, IpAddress, IpListenEndpoint, IpProtocol, IpRepr,
};

use super::PollAt;

/// An ICMP packet ring buffer.
pub type PacketBuffer<'a> = crate::storage::PacketBuffer<'a, IpAddress>;

/// An ICMP packet metadata.
pub type PacketMetadata = crate::storage::PacketMetadata<IpAddress>;

/// Type of endpoint to bind the ICMP socket to. See [Socket::bind] for more
/// details.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Endpoint {
    #[default]
    Unspecified,
    /// Bind to ICMP echo requests/replies carrying the given identifier.
    Ident(u16),
    /// Bind to ICMP error messages quoting a UDP datagram sent from the
    /// given local endpoint.
    Udp(IpListenEndpoint),
}

/// Error returned by [`Socket::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindError;

impl core::fmt::Display for BindError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "unaddressable")
    }
}

/// An ICMP socket.
///
/// An ICMP socket is bound to a specific [`Endpoint`], which may be a
/// specific echo identifier value or a UDP port to listen for related ICMP
/// error messages on. See [`bind`](Socket::bind) for more details.
#[derive(Debug)]
pub struct Socket<'a> {
    rx_buffer: PacketBuffer<'a>,
    tx_buffer: PacketBuffer<'a>,
    endpoint: Endpoint,
    hop_limit: Option<u8>,
}

impl<'a> Socket<'a> {
    /// Create an ICMP socket with the given buffers.
    pub fn new(rx_buffer: PacketBuffer<'a>, tx_buffer: PacketBuffer<'a>) -> Socket<'a> {
        Socket {
            rx_buffer,
            tx_buffer,
            endpoint: Default::default(),
            hop_limit: None,
        }
    }

    /// Return the bound endpoint.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Bind the socket to the given endpoint.
    ///
    /// This function returns `Err(BindError)` if the socket was open
    /// (see [`is_open`](Self::is_open)), or if `endpoint` is unspecified.
    pub fn bind<T: Into<Endpoint>>(&mut self, endpoint: T) -> Result<(), BindError> {
        let endpoint = endpoint.into();
        if endpoint == Endpoint::Unspecified {
            return Err(BindError);
        }

        self.endpoint = endpoint;
        self.rx_buffer.reset();
        self.tx_buffer.reset();
        Ok(())
    }

    /// Whether the socket is open, i.e. bound to an endpoint.
    pub fn is_open(&self) -> bool {
        self.endpoint != Endpoint::Unspecified
    }

    /// Close the socket.
    pub fn close(&mut self) {
        self.endpoint = Endpoint::Unspecified;
        self.rx_buffer.reset();
        self.tx_buffer.reset();
    }

    /// Set the time-to-live (IPv4) value used in outgoing packets.
    pub fn set_hop_limit(&mut self, hop_limit: Option<u8>) {
        assert!(hop_limit != Some(0));
        self.hop_limit = hop_limit;
    }

    /// Return the time-to-live value used in outgoing packets.
    pub fn hop_limit(&self) -> Option<u8> {
        self.hop_limit
    }

    /// Check whether the transmit buffer is not full.
    pub fn can_send(&self) -> bool {
        !self.tx_buffer.is_full()
    }

    /// Check whether the receive buffer is not empty.
    pub fn can_recv(&self) -> bool {
        !self.rx_buffer.is_empty()
    }

    /// Enqueue a packet (a full ICMP message, header included) to be sent to
    /// a remote address.
    pub fn send_slice(&mut self, data: &[u8], remote_addr: IpAddress) -> Result<(), Full> {
        self.tx_buffer.enqueue_slice(data, remote_addr)
    }

    /// Dequeue a packet, and return the address it was sent from.
    pub fn recv_slice(&mut self, data: &mut [u8]) -> Result<(usize, IpAddress), Empty> {
        let (endpoint, buffer) = self.rx_buffer.dequeue()?;
        let length = cmp::min(data.len(), buffer.len());
        data[..length].copy_from_slice(&buffer[..length]);
        Ok((length, endpoint))
    }

    pub(crate) fn accepts_v4(
        &self,
        _cx: &mut InterfaceInner,
        _ip_repr: &crate::wire::Ipv4Repr,
        icmp_repr: &Icmpv4Repr,
    ) -> bool {
        match (self.endpoint, icmp_repr) {
            (Endpoint::Ident(bound_ident), Icmpv4Repr::EchoReply { ident, .. }) => {
                *ident == bound_ident
            }
            (
                Endpoint::Udp(bound_endpoint),
                Icmpv4Repr::DstUnreachable { data, .. } | Icmpv4Repr::TimeExceeded { data, .. },
            ) => quoted_udp_src_port(data) == Some(bound_endpoint.port),
            _ => false,
        }
    }

    pub(crate) fn process_v4(
        &mut self,
        _cx: &mut InterfaceInner,
        ip_repr: &crate::wire::Ipv4Repr,
        icmp_repr: &Icmpv4Repr,
    ) {
        let buffer_len = icmp_repr.buffer_len();
        let src_addr = IpAddress::Ipv4(ip_repr.src_addr);
        let _ = self
            .rx_buffer
            .enqueue_with_infallible(buffer_len, src_addr, |buf| {
                icmp_repr.emit(
                    &mut Icmpv4Packet::new_unchecked(buf),
                    &crate::phy::ChecksumCapabilities::default(),
                );
                buffer_len
            });
    }

    pub(crate) fn dispatch<F, E>(&mut self, cx: &mut InterfaceInner, emit: F) -> Result<(), E>
    where
        F: FnOnce(&mut InterfaceInner, (IpRepr, IcmpRepr)) -> Result<(), E>,
    {
        let endpoint = match self.endpoint {
            Endpoint::Unspecified => return Ok(()),
            _ => self.endpoint,
        };
        let _ = endpoint;
        let hop_limit = self.hop_limit.unwrap_or(64);

        let Ok((remote_addr, packet)) = self.tx_buffer.dequeue() else {
            return Ok(());
        };

        match remote_addr {
            IpAddress::Ipv4(remote_addr_v4) => {
                let Ok(icmp_packet) = Icmpv4Packet::new_checked(packet) else {
                    return Ok(());
                };
                let Ok(icmp_repr) =
                    Icmpv4Repr::parse(&icmp_packet, &crate::phy::ChecksumCapabilities::default())
                else {
                    return Ok(());
                };

                let Some(src_addr) = cx.get_source_address(&remote_addr).map(|a| match a {
                    IpAddress::Ipv4(a) => a,
                }) else {
                    return Ok(());
                };

                let ip_repr = IpRepr::Ipv4(crate::wire::Ipv4Repr {
                    src_addr,
                    dst_addr: remote_addr_v4,
                    next_header: IpProtocol::Icmp,
                    payload_len: icmp_repr.buffer_len(),
                    hop_limit,
                });

                emit(cx, (ip_repr, IcmpRepr::Ipv4(icmp_repr)))
            }
        }
    }

    pub(crate) fn poll_at(&self, _cx: &mut InterfaceInner) -> PollAt {
        if self.tx_buffer.is_empty() {
            PollAt::Ingress
        } else {
            PollAt::Now
        }
    }
}

/// Extract the source port of a UDP datagram quoted inside an ICMP error
/// message's data, if `data` looks like one (first 8 bytes of a UDP header).
fn quoted_udp_src_port(data: &[u8]) -> Option<u16> {
    // `data` is the offending IP header followed by as much of its payload
    // as fit; skip the IP header using its own IHL field.
    if data.is_empty() {
        return None;
    }
    let ihl = (data[0] & 0x0f) as usize * 4;
    let udp = data.get(ihl..ihl + 8)?;
    Some(u16::from_be_bytes([udp[0], udp[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PacketMetadata as RawPacketMetadata;

    fn socket() -> Socket<'static> {
        Socket::new(
            PacketBuffer::new(vec![RawPacketMetadata::EMPTY; 4], vec![0u8; 256]),
            PacketBuffer::new(vec![RawPacketMetadata::EMPTY; 4], vec![0u8; 256]),
        )
    }

    #[test]
    fn bind_requires_non_unspecified_endpoint() {
        let mut s = socket();
        assert!(s.bind(Endpoint::Unspecified).is_err());
        assert!(s.bind(Endpoint::Ident(1)).is_ok());
        assert!(s.is_open());
    }

    #[test]
    fn accepts_echo_reply_with_matching_ident_only() {
        let mut s = socket();
        s.bind(Endpoint::Ident(42)).unwrap();
        let mut device = crate::phy::Loopback::new(crate::phy::Medium::Ethernet);
        let mut iface = crate::iface::Interface::new(
            crate::iface::Config::new(crate::wire::HardwareAddress::Ethernet(
                crate::wire::EthernetAddress::from_bytes(&[2, 0, 0, 0, 0, 1]),
            )),
            &mut device,
            crate::time::Instant::from_millis(0),
        );
        let ctx = iface.context();
        let ipv4_repr = crate::wire::Ipv4Repr {
            src_addr: crate::wire::Ipv4Address::new(127, 0, 0, 1),
            dst_addr: crate::wire::Ipv4Address::new(127, 0, 0, 1),
            next_header: IpProtocol::Icmp,
            payload_len: 0,
            hop_limit: 64,
        };
        let matching = Icmpv4Repr::EchoReply {
            ident: 42,
            seq_no: 1,
            data: b"x",
        };
        let other = Icmpv4Repr::EchoReply {
            ident: 7,
            seq_no: 1,
            data: b"x",
        };
        assert!(s.accepts_v4(ctx, &ipv4_repr, &matching));
        assert!(!s.accepts_v4(ctx, &ipv4_repr, &other));
    }
}
