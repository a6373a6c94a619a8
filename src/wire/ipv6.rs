use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

pub use core::net::Ipv6Addr as Address;

use super::{Error, IpProtocol, Result};

pub const ADDR_SIZE: usize = 16;

/// IPv6 requires that all links support an MTU of 1280 octets or greater (RFC 8200 §5).
pub const MIN_MTU: usize = 1280;

/// A specification of an IPv6 CIDR block.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct Cidr {
    address: Address,
    prefix_len: u8,
}

impl Cidr {
    pub const fn new(address: Address, prefix_len: u8) -> Cidr {
        assert!(prefix_len <= 128);
        Cidr {
            address,
            prefix_len,
        }
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn contains_addr(&self, addr: &Address) -> bool {
        fn mask(addr: &Address, prefix_len: u8) -> [u8; 16] {
            let mut bytes = addr.octets();
            let mut remaining = 128 - prefix_len as u32;
            for byte in bytes.iter_mut().rev() {
                if remaining >= 8 {
                    *byte = 0;
                    remaining -= 8;
                } else if remaining > 0 {
                    *byte &= !0u8 << remaining;
                    remaining = 0;
                } else {
                    break;
                }
            }
            bytes
        }
        mask(&self.address, self.prefix_len) == mask(addr, self.prefix_len)
    }

    pub fn contains_subnet(&self, subnet: &Cidr) -> bool {
        self.prefix_len <= subnet.prefix_len && self.contains_addr(&subnet.address)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

pub(crate) trait AddressExt {
    fn from_bytes(data: &[u8]) -> Self;
    fn solicited_node(&self) -> Address;
    fn x_is_unicast_link_local(&self) -> bool;
}

impl AddressExt for Address {
    fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0u8; ADDR_SIZE];
        bytes.copy_from_slice(data);
        Address::from(bytes)
    }

    /// The solicited-node multicast address corresponding to this address (RFC 4291 §2.7.1).
    fn solicited_node(&self) -> Address {
        let o = self.octets();
        Address::from([
            0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0xff, o[13], o[14], o[15],
        ])
    }

    fn x_is_unicast_link_local(&self) -> bool {
        let o = self.octets();
        o[0] == 0xfe && (o[1] & 0xc0) == 0x80
    }
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::*;

    pub const VER_TC_FLOW: Field = 0..4;
    pub const LENGTH: Field = 4..6;
    pub const NXT_HDR: usize = 6;
    pub const HOP_LIMIT: usize = 7;
    pub const SRC_ADDR: Field = 8..24;
    pub const DST_ADDR: Field = 24..40;
}

pub const HEADER_LEN: usize = field::DST_ADDR.end;

/// A read/write wrapper around an Internet Protocol version 6 packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN || len < HEADER_LEN + self.payload_len() as usize {
            Err(Error)
        } else {
            Ok(())
        }
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    pub fn version(&self) -> u8 {
        self.buffer.as_ref()[0] >> 4
    }

    pub fn traffic_class(&self) -> u8 {
        let data = self.buffer.as_ref();
        ((data[0] & 0x0f) << 4) | (data[1] >> 4)
    }

    pub fn flow_label(&self) -> u32 {
        let data = self.buffer.as_ref();
        (u32::from(data[1] & 0x0f) << 16) | (u32::from(data[2]) << 8) | u32::from(data[3])
    }

    pub fn payload_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::LENGTH])
    }

    pub fn next_header(&self) -> IpProtocol {
        IpProtocol::from(self.buffer.as_ref()[field::NXT_HDR])
    }

    pub fn hop_limit(&self) -> u8 {
        self.buffer.as_ref()[field::HOP_LIMIT]
    }

    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.buffer.as_ref()[field::SRC_ADDR])
    }

    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.buffer.as_ref()[field::DST_ADDR])
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    pub fn payload(&self) -> &'a [u8] {
        let len = self.payload_len() as usize;
        &self.buffer.as_ref()[HEADER_LEN..HEADER_LEN + len]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_version(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[0] = (data[0] & 0x0f) | (value << 4);
    }

    pub fn set_traffic_class(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[0] = (data[0] & 0xf0) | (value >> 4);
        data[1] = (data[1] & 0x0f) | (value << 4);
    }

    pub fn set_flow_label(&mut self, value: u32) {
        let data = self.buffer.as_mut();
        data[1] = (data[1] & 0xf0) | ((value >> 16) as u8 & 0x0f);
        data[2] = (value >> 8) as u8;
        data[3] = value as u8;
    }

    pub fn set_payload_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::LENGTH], value);
    }

    pub fn set_next_header(&mut self, value: IpProtocol) {
        self.buffer.as_mut()[field::NXT_HDR] = value.into();
    }

    pub fn set_hop_limit(&mut self, value: u8) {
        self.buffer.as_mut()[field::HOP_LIMIT] = value;
    }

    pub fn set_src_addr(&mut self, value: Address) {
        self.buffer.as_mut()[field::SRC_ADDR].copy_from_slice(&value.octets());
    }

    pub fn set_dst_addr(&mut self, value: Address) {
        self.buffer.as_mut()[field::DST_ADDR].copy_from_slice(&value.octets());
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let len = self.payload_len() as usize;
        &mut self.buffer.as_mut()[HEADER_LEN..HEADER_LEN + len]
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A high-level representation of an IPv6 packet header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_addr: Address,
    pub dst_addr: Address,
    pub next_header: IpProtocol,
    pub payload_len: usize,
    pub hop_limit: u8,
}

impl Repr {
    pub fn parse(packet: &Packet<&[u8]>) -> Result<Repr> {
        if packet.version() != 6 {
            return Err(Error);
        }
        packet.check_len()?;
        Ok(Repr {
            src_addr: packet.src_addr(),
            dst_addr: packet.dst_addr(),
            next_header: packet.next_header(),
            payload_len: packet.payload_len() as usize,
            hop_limit: packet.hop_limit(),
        })
    }

    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(&self, packet: &mut Packet<&mut T>) {
        packet.set_version(6);
        packet.set_traffic_class(0);
        packet.set_flow_label(0);
        packet.set_payload_len(self.payload_len as u16);
        packet.set_next_header(self.next_header);
        packet.set_hop_limit(self.hop_limit);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "IPv6 src={} dst={} nxt={} len={}",
            self.src_addr, self.dst_addr, self.next_header, self.payload_len
        )
    }
}

/// Minimal Hop-by-Hop Options header representation: enough to skip the
/// header (and honor Router Alert) without implementing the full option
/// type-length-value registry (spec §1 excludes IGMP/MLD internals beyond
/// group membership bookkeeping).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct HopByHopRepr {
    pub next_header: IpProtocol,
    /// Length of the extension header, in octets, including the 2-octet prefix.
    pub ext_len: usize,
}

impl HopByHopRepr {
    pub fn parse(data: &[u8]) -> Result<HopByHopRepr> {
        if data.len() < 2 {
            return Err(Error);
        }
        let next_header = IpProtocol::from(data[0]);
        let ext_len = (data[1] as usize + 1) * 8;
        if data.len() < ext_len {
            return Err(Error);
        }
        Ok(HopByHopRepr {
            next_header,
            ext_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPR: Repr = Repr {
        src_addr: Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1),
        dst_addr: Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 2),
        next_header: IpProtocol::Udp,
        payload_len: 4,
        hop_limit: 64,
    };

    #[test]
    fn emit_then_parse_roundtrips() {
        let mut buf = [0u8; HEADER_LEN + 4];
        buf[HEADER_LEN..].copy_from_slice(&[9, 9, 9, 9]);
        REPR.emit(&mut Packet::new_unchecked(&mut buf));
        let packet = Packet::new_checked(&buf[..]).unwrap();
        assert_eq!(Repr::parse(&packet).unwrap(), REPR);
    }

    #[test]
    fn cidr_contains_addr() {
        let cidr = Cidr::new(Address::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0), 32);
        assert!(cidr.contains_addr(&Address::new(0x2001, 0xdb8, 1, 2, 3, 4, 5, 6)));
        assert!(!cidr.contains_addr(&Address::new(0x2001, 0xdb9, 0, 0, 0, 0, 0, 1)));
    }

    #[test]
    fn solicited_node_multicast() {
        let addr = Address::new(0xfe80, 0, 0, 0, 0x1234, 0x5678, 0x9abc, 0xdef0);
        let sol = addr.solicited_node();
        assert_eq!(sol.octets()[0..2], [0xff, 0x02]);
        assert_eq!(sol.octets()[13..16], [0xbc, 0xde, 0xf0]);
    }
}
