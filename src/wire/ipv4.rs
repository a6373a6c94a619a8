use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

pub use core::net::Ipv4Addr as Address;

use super::ip::checksum;
use super::{Error, IpProtocol, Result};
use crate::phy::ChecksumCapabilities;

pub const ADDR_SIZE: usize = 4;

/// Minimum MTU required of all links supporting IPv4. Below this a link
/// cannot carry a full, unfragmented IPv4 header plus one octet of payload.
pub const MIN_MTU: usize = 576;

pub const MULTICAST_ALL_SYSTEMS: Address = Address::new(224, 0, 0, 1);
pub const MULTICAST_ALL_ROUTERS: Address = Address::new(224, 0, 0, 2);

/// A specification of an IPv4 CIDR block, containing an address and a variable-length
/// subnet masking prefix length.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct Cidr {
    address: Address,
    prefix_len: u8, // mask prefix length
}

impl Cidr {
    /// Return the address of this IPv4 CIDR block.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Create an IPv4 CIDR block from the given address and prefix length.
    ///
    /// # Panics
    /// This function panics if the prefix length is larger than 32.
    pub const fn new(address: Address, prefix_len: u8) -> Cidr {
        assert!(prefix_len <= 32);
        Cidr {
            address,
            prefix_len,
        }
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Return the network mask for this CIDR block.
    pub fn netmask(&self) -> Address {
        if self.prefix_len == 0 {
            return Address::new(0, 0, 0, 0);
        }
        let number = 0xffff_ffffu32 << (32 - self.prefix_len);
        Address::from_bits(number)
    }

    /// Return the broadcast address for this CIDR block.
    pub fn broadcast(&self) -> Option<Address> {
        let network = self.network();
        Some(Address::from_bits(
            u32::from(network.address()) | !u32::from(self.netmask()),
        ))
    }

    /// Return the network block of this CIDR.
    pub fn network(&self) -> Cidr {
        let mask = u32::from(self.netmask());
        let network = u32::from(self.address) & mask;
        Cidr::new(Address::from_bits(network), self.prefix_len)
    }

    /// Query whether the subnetwork described by this CIDR block contains
    /// the given address.
    pub fn contains_addr(&self, addr: &Address) -> bool {
        let mask = u32::from(self.netmask());
        u32::from(self.address) & mask == u32::from(*addr) & mask
    }

    /// Query whether the subnetwork described by this CIDR block contains
    /// the subnetwork described by the given CIDR block.
    pub fn contains_subnet(&self, subnet: &Cidr) -> bool {
        self.prefix_len <= subnet.prefix_len && self.contains_addr(&subnet.address)
    }
}

pub(crate) trait AddressExt {
    /// Construct an IPv4 address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not four octets long.
    fn from_bytes(data: &[u8]) -> Self;

    /// Query whether the address is an unicast address.
    ///
    /// `x_` prefix is to avoid a collision with the still-unstable method in `core::ip`.
    fn x_is_unicast(&self) -> bool;

    /// If `self` is a CIDR-compatible subnet mask, return `Some(prefix_len)`,
    /// where `prefix_len` is the number of leading zeroes. Return `None` otherwise.
    fn prefix_len(&self) -> Option<u8>;
}

impl AddressExt for Address {
    fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; ADDR_SIZE];
        bytes.copy_from_slice(data);
        Address::from_bits(u32::from_be_bytes(bytes))
    }

    /// Query whether the address is an unicast address.
    fn x_is_unicast(&self) -> bool {
        !(self.is_broadcast() || self.is_multicast() || self.is_unspecified())
    }

    fn prefix_len(&self) -> Option<u8> {
        let mut ones = true;
        let mut prefix_len = 0;
        for byte in self.octets() {
            let mut mask = 0x80;
            for _ in 0..8 {
                let one = byte & mask != 0;
                if ones {
                    // Expect 1s until first 0
                    if one {
                        prefix_len += 1;
                    } else {
                        ones = false;
                    }
                } else if one {
                    // 1 where 0 was expected
                    return None;
                }
                mask >>= 1;
            }
        }
        Some(prefix_len)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::*;

    pub const VER_IHL: usize = 0;
    pub const DSCP_ECN: usize = 1;
    pub const LENGTH: Field = 2..4;
    pub const IDENT: Field = 4..6;
    pub const FLG_OFF: Field = 6..8;
    pub const TTL: usize = 8;
    pub const PROTOCOL: usize = 9;
    pub const CHECKSUM: Field = 10..12;
    pub const SRC_ADDR: Field = 12..16;
    pub const DST_ADDR: Field = 16..20;

    pub const fn OPTIONS(ihl: u8) -> Field {
        DST_ADDR.end..(ihl as usize * 4)
    }
}

pub const HEADER_LEN: usize = field::DST_ADDR.end;

/// Fragmentation/reassembly key: identifies one IPv4 datagram's fragments.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub struct Key {
    pub id: u16,
    pub src_addr: Address,
    pub dst_addr: Address,
    pub protocol: IpProtocol,
}

/// A read/write wrapper around an Internet Protocol version 4 packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

#[allow(clippy::len_without_is_empty)]
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
        if len < HEADER_LEN {
            return Err(Error);
        }
        let ihl = self.header_len() as usize;
        if ihl < HEADER_LEN || ihl > len {
            return Err(Error);
        }
        if usize::from(self.total_len()) < ihl || usize::from(self.total_len()) > len {
            return Err(Error);
        }
        Ok(())
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    pub fn version(&self) -> u8 {
        self.buffer.as_ref()[field::VER_IHL] >> 4
    }

    /// Header length, in octets.
    pub fn header_len(&self) -> u8 {
        (self.buffer.as_ref()[field::VER_IHL] & 0x0f) * 4
    }

    pub fn dscp(&self) -> u8 {
        self.buffer.as_ref()[field::DSCP_ECN] >> 2
    }

    pub fn ecn(&self) -> u8 {
        self.buffer.as_ref()[field::DSCP_ECN] & 0x03
    }

    pub fn total_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::LENGTH])
    }

    pub fn ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::IDENT])
    }

    pub fn dont_frag(&self) -> bool {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::FLG_OFF]) & 0x4000 != 0
    }

    pub fn more_frags(&self) -> bool {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::FLG_OFF]) & 0x2000 != 0
    }

    pub fn frag_offset(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::FLG_OFF]) & 0x1fff
    }

    pub fn hop_limit(&self) -> u8 {
        self.buffer.as_ref()[field::TTL]
    }

    pub fn protocol(&self) -> IpProtocol {
        IpProtocol::from(self.buffer.as_ref()[field::PROTOCOL])
    }

    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::CHECKSUM])
    }

    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.buffer.as_ref()[field::SRC_ADDR])
    }

    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.buffer.as_ref()[field::DST_ADDR])
    }

    pub fn verify_checksum(&self) -> bool {
        let data = self.buffer.as_ref();
        checksum::data(&data[..self.header_len() as usize]) == !0
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    pub fn payload(&self) -> &'a [u8] {
        let range = self.header_len() as usize..self.total_len() as usize;
        &self.buffer.as_ref()[range]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_version(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::VER_IHL] = (data[field::VER_IHL] & 0x0f) | (value << 4);
    }

    pub fn set_header_len(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::VER_IHL] = (data[field::VER_IHL] & 0xf0) | ((value / 4) & 0x0f);
    }

    pub fn set_dscp_ecn(&mut self, value: u8) {
        self.buffer.as_mut()[field::DSCP_ECN] = value;
    }

    pub fn set_total_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::LENGTH], value);
    }

    pub fn set_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::IDENT], value);
    }

    pub fn set_flags_frag_offset(&mut self, dont_frag: bool, more_frags: bool, offset: u16) {
        let mut raw = offset & 0x1fff;
        if dont_frag {
            raw |= 0x4000;
        }
        if more_frags {
            raw |= 0x2000;
        }
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::FLG_OFF], raw);
    }

    pub fn set_hop_limit(&mut self, value: u8) {
        self.buffer.as_mut()[field::TTL] = value;
    }

    pub fn set_protocol(&mut self, value: IpProtocol) {
        self.buffer.as_mut()[field::PROTOCOL] = value.into();
    }

    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CHECKSUM], value);
    }

    pub fn set_src_addr(&mut self, value: Address) {
        self.buffer.as_mut()[field::SRC_ADDR].copy_from_slice(&value.octets());
    }

    pub fn set_dst_addr(&mut self, value: Address) {
        self.buffer.as_mut()[field::DST_ADDR].copy_from_slice(&value.octets());
    }

    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = {
            let data = self.buffer.as_ref();
            !checksum::data(&data[..self.header_len() as usize])
        };
        self.set_checksum(checksum)
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let range = self.header_len() as usize..self.total_len() as usize;
        &mut self.buffer.as_mut()[range]
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A high-level representation of an Internet Protocol version 4 packet header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_addr: Address,
    pub dst_addr: Address,
    pub next_header: IpProtocol,
    pub payload_len: usize,
    pub hop_limit: u8,
}

impl Repr {
    /// Parse an IPv4 packet and return a high-level representation.
    ///
    /// IP options, if present, are ignored; fragmentation fields are
    /// validated only to the extent of rejecting a fragmented-but-claimed
    /// fragment offset 0 with MF set and no IP options support beyond skip.
    pub fn parse(
        packet: &Packet<&[u8]>,
        checksum_caps: &ChecksumCapabilities,
    ) -> Result<Repr> {
        if packet.version() != 4 {
            return Err(Error);
        }
        packet.check_len()?;
        if checksum_caps.ipv4.rx() && !packet.verify_checksum() {
            return Err(Error);
        }
        Ok(Repr {
            src_addr: packet.src_addr(),
            dst_addr: packet.dst_addr(),
            next_header: packet.protocol(),
            payload_len: packet.payload().len(),
            hop_limit: packet.hop_limit(),
        })
    }

    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(
        &self,
        packet: &mut Packet<&mut T>,
        checksum_caps: &ChecksumCapabilities,
    ) {
        packet.set_version(4);
        packet.set_header_len(HEADER_LEN as u8);
        packet.set_dscp_ecn(0);
        packet.set_total_len((HEADER_LEN + self.payload_len) as u16);
        packet.set_ident(0);
        packet.set_flags_frag_offset(true, false, 0);
        packet.set_hop_limit(self.hop_limit);
        packet.set_protocol(self.next_header);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);

        if checksum_caps.ipv4.tx() {
            packet.fill_checksum();
        } else {
            // Ensure a consistently zeroed checksum, since implementations
            // may rely on it.
            packet.set_checksum(0);
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "IPv4 src={} dst={} proto={} len={}",
            self.src_addr, self.dst_addr, self.next_header, self.payload_len
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPR: Repr = Repr {
        src_addr: Address::new(192, 168, 1, 1),
        dst_addr: Address::new(192, 168, 1, 2),
        next_header: IpProtocol::Udp,
        payload_len: 4,
        hop_limit: 64,
    };

    #[test]
    fn emit_then_parse_roundtrips() {
        let mut buf = [0u8; HEADER_LEN + 4];
        buf[HEADER_LEN..].copy_from_slice(&[1, 2, 3, 4]);
        let caps = ChecksumCapabilities::default();
        REPR.emit(&mut Packet::new_unchecked(&mut buf), &caps);

        let packet = Packet::new_checked(&buf[..]).unwrap();
        assert!(packet.verify_checksum());
        let parsed = Repr::parse(&packet, &caps).unwrap();
        assert_eq!(parsed, REPR);
    }

    #[test]
    fn cidr_contains_addr() {
        let cidr = Cidr::new(Address::new(192, 168, 1, 0), 24);
        assert!(cidr.contains_addr(&Address::new(192, 168, 1, 42)));
        assert!(!cidr.contains_addr(&Address::new(192, 168, 2, 1)));
    }

    #[test]
    fn cidr_broadcast() {
        let cidr = Cidr::new(Address::new(10, 0, 0, 5), 24);
        assert_eq!(cidr.broadcast(), Some(Address::new(10, 0, 0, 255)));
    }
}
