//! UDP sockets: connectionless datagram delivery bound to a local port.

use core::cmp;

use crate::iface::InterfaceInner;
use crate::phy::PacketMeta;
use crate::storage::{Empty, Full};
use crate::wire::{IpAddress, IpEndpoint, IpListenEndpoint, IpProtocol, IpRepr, UdpRepr};

use super::PollAt;

/// A UDP packet ring buffer.
pub type PacketBuffer<'a> = crate::storage::PacketBuffer<'a, UdpMetadata>;

/// A UDP packet metadata.
pub type PacketMetadata = crate::storage::PacketMetadata<UdpMetadata>;

/// Metadata for a sent or received UDP packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct UdpMetadata {
    /// The IP endpoint from which an incoming datagram was received, or to which an outgoing
    /// datagram will be sent.
    pub endpoint: IpEndpoint,
    /// The IP address to which an incoming datagram was sent, or from which an outgoing datagram
    /// will be sent. Incoming datagrams always have this set. On outgoing datagrams, if it is not
    /// set, and the socket is not bound to a single address anyway, a suitable address will be
    /// determined using the algorithms of RFC 6724 (candidate source address selection) or some
    /// heuristic (for IPv4).
    pub local_address: Option<IpAddress>,
    pub meta: PacketMeta,
}

impl From<IpEndpoint> for UdpMetadata {
    fn from(endpoint: IpEndpoint) -> UdpMetadata {
        UdpMetadata {
            endpoint,
            local_address: None,
            meta: PacketMeta::default(),
        }
    }
}

/// Error returned by [`Socket::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindError;

impl core::fmt::Display for BindError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "unaddressable")
    }
}

/// Error returned by [`Socket::send`]/[`Socket::send_slice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    Unaddressable,
    BufferFull,
}

impl core::fmt::Display for SendError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            SendError::Unaddressable => write!(f, "unaddressable"),
            SendError::BufferFull => write!(f, "buffer full"),
        }
    }
}

/// Error returned by [`Socket::recv`]/[`Socket::recv_slice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvError;

impl core::fmt::Display for RecvError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "exhausted")
    }
}

/// A User Datagram Protocol socket.
///
/// A UDP socket is bound to a specific endpoint, and owns transmit and
/// receive packet buffers.
#[derive(Debug)]
pub struct Socket<'a> {
    endpoint: IpListenEndpoint,
    rx_buffer: PacketBuffer<'a>,
    tx_buffer: PacketBuffer<'a>,
    /// The time-to-live (IPv4) or hop limit (IPv6) value used in outgoing packets.
    hop_limit: Option<u8>,
}

impl<'a> Socket<'a> {
    /// Create an UDP socket with the given buffers.
    pub fn new(rx_buffer: PacketBuffer<'a>, tx_buffer: PacketBuffer<'a>) -> Socket<'a> {
        Socket {
            endpoint: IpListenEndpoint::default(),
            rx_buffer,
            tx_buffer,
            hop_limit: None,
        }
    }

    /// Return the bound endpoint.
    pub fn endpoint(&self) -> IpListenEndpoint {
        self.endpoint
    }

    /// Whether the socket is open, i.e. bound to a port.
    pub fn is_open(&self) -> bool {
        self.endpoint.port != 0
    }

    /// Bind the socket to the given endpoint.
    ///
    /// This function returns `Err(BindError)` if the port in the given endpoint is zero.
    pub fn bind<T: Into<IpListenEndpoint>>(&mut self, endpoint: T) -> Result<(), BindError> {
        let endpoint = endpoint.into();
        if endpoint.port == 0 {
            return Err(BindError);
        }

        self.endpoint = endpoint;
        self.rx_buffer.reset();
        self.tx_buffer.reset();
        Ok(())
    }

    /// Close the socket.
    pub fn close(&mut self) {
        self.endpoint = IpListenEndpoint::default();
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

    /// Return the maximum number packets the socket can receive.
    pub fn packet_recv_capacity(&self) -> usize {
        self.rx_buffer.packet_capacity()
    }

    /// Return the maximum number packets the socket can transmit.
    pub fn packet_send_capacity(&self) -> usize {
        self.tx_buffer.packet_capacity()
    }

    /// Check whether the transmit buffer is not full.
    pub fn can_send(&self) -> bool {
        !self.tx_buffer.is_full()
    }

    /// Check whether the receive buffer is not empty.
    pub fn can_recv(&self) -> bool {
        !self.rx_buffer.is_empty()
    }

    /// Enqueue a packet to be sent to a given remote endpoint, and return a
    /// pointer to its payload.
    pub fn send_slice<T>(&mut self, data: &[u8], meta: T) -> Result<(), SendError>
    where
        T: Into<UdpMetadata>,
    {
        let meta = meta.into();
        if !self.endpoint.is_specified() {
            return Err(SendError::Unaddressable);
        }
        if meta.endpoint.port == 0 || meta.endpoint.addr.is_unspecified() {
            return Err(SendError::Unaddressable);
        }

        self.tx_buffer
            .enqueue_slice(data, meta)
            .map_err(|Full| SendError::BufferFull)
    }

    /// Dequeue a packet, and return the source endpoint along with its metadata.
    pub fn recv_slice(&mut self, data: &mut [u8]) -> Result<(usize, UdpMetadata), RecvError> {
        let (meta, buffer) = self.rx_buffer.dequeue().map_err(|Empty| RecvError)?;
        let length = cmp::min(data.len(), buffer.len());
        data[..length].copy_from_slice(&buffer[..length]);
        Ok((length, meta))
    }

    pub(crate) fn accepts(
        &self,
        _cx: &mut InterfaceInner,
        ip_repr: &IpRepr,
        repr: &UdpRepr,
    ) -> bool {
        if self.endpoint.port != repr.dst_port {
            return false;
        }
        match self.endpoint.addr {
            Some(addr) => addr == ip_repr.dst_addr(),
            None => true,
        }
    }

    pub(crate) fn process(
        &mut self,
        _cx: &mut InterfaceInner,
        meta: PacketMeta,
        ip_repr: &IpRepr,
        repr: &UdpRepr,
        payload: &[u8],
    ) {
        let metadata = UdpMetadata {
            endpoint: IpEndpoint::new(ip_repr.src_addr(), repr.src_port),
            local_address: Some(ip_repr.dst_addr()),
            meta,
        };

        if self
            .rx_buffer
            .enqueue_slice(payload, metadata)
            .is_err()
        {
            net_debug!("udp: buffer full, dropped incoming packet");
        }
    }

    pub(crate) fn dispatch<F, E>(&mut self, cx: &mut InterfaceInner, emit: F) -> Result<(), E>
    where
        F: FnOnce(&mut InterfaceInner, PacketMeta, (IpRepr, UdpRepr, &[u8])) -> Result<(), E>,
    {
        let hop_limit = self.hop_limit.unwrap_or(64);

        let Ok((meta, payload)) = self.tx_buffer.dequeue() else {
            return Ok(());
        };

        let src_addr = match meta.local_address {
            Some(addr) => addr,
            None => match cx.get_source_address(&meta.endpoint.addr) {
                Some(addr) => addr,
                None => return Ok(()),
            },
        };

        let udp_repr = UdpRepr {
            src_port: self.endpoint.port,
            dst_port: meta.endpoint.port,
        };

        let ip_repr = IpRepr::new(
            src_addr,
            meta.endpoint.addr,
            IpProtocol::Udp,
            udp_repr.header_len() + payload.len(),
            hop_limit,
        );

        emit(cx, meta.meta, (ip_repr, udp_repr, payload))
    }

    pub(crate) fn poll_at(&self, _cx: &mut InterfaceInner) -> PollAt {
        if self.tx_buffer.is_empty() {
            PollAt::Ingress
        } else {
            PollAt::Now
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PacketMetadata as RawPacketMetadata;
    use crate::wire::Ipv4Address;

    fn socket() -> Socket<'static> {
        Socket::new(
            PacketBuffer::new(vec![RawPacketMetadata::EMPTY; 4], vec![0u8; 256]),
            PacketBuffer::new(vec![RawPacketMetadata::EMPTY; 4], vec![0u8; 256]),
        )
    }

    #[test]
    fn bind_rejects_port_zero() {
        let mut s = socket();
        assert!(s.bind(0).is_err());
        assert!(s.bind(12345).is_ok());
        assert!(s.is_open());
    }

    #[test]
    fn send_before_bind_is_rejected() {
        let mut s = socket();
        let remote = IpEndpoint::new(IpAddress::Ipv4(Ipv4Address::new(127, 0, 0, 1)), 9);
        assert_eq!(
            s.send_slice(b"hi", remote),
            Err(SendError::Unaddressable)
        );
    }

    #[test]
    fn send_then_recv_roundtrip() {
        let mut s = socket();
        s.bind(9000).unwrap();
        let remote = IpEndpoint::new(IpAddress::Ipv4(Ipv4Address::new(127, 0, 0, 1)), 9);
        s.send_slice(b"hello", remote).unwrap();
        assert!(s.can_send());
    }
}
