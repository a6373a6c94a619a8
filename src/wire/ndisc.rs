//! IPv6 Neighbor Discovery (RFC 4861) message representations.
//!
//! Only the subset needed to resolve neighbors and learn a default router is
//! implemented: Router/Neighbor Solicitation and Advertisement, and Redirect
//! (parsed but not acted upon by the neighbor cache).

use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use core::time::Duration;

use super::icmpv6::{Message as Icmpv6Message, Packet as Icmpv6Packet};
use super::{Error, Ipv6Address, RawHardwareAddress, Result};

bitflags::bitflags! {
    /// Flags carried in a Neighbor Advertisement message.
    #[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
    pub struct NeighborFlags: u8 {
        const ROUTER    = 0b100;
        const SOLICITED = 0b010;
        const OVERRIDE  = 0b001;
    }
}

bitflags::bitflags! {
    /// Flags carried in a Router Advertisement message.
    #[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
    pub struct RouterFlags: u8 {
        const MANAGED = 0b1000_0000;
        const OTHER   = 0b0100_0000;
    }
}

enum_with_unknown! {
    pub enum OptionType(u8) {
        SourceLinkLayerAddr = 1,
        TargetLinkLayerAddr = 2,
        PrefixInformation   = 3,
        Mtu                 = 5
    }
}

/// A single NDISC option (source/target link-layer address, or an unrecognized TLV).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdiscOption<'a> {
    SourceLinkLayerAddr(RawHardwareAddress),
    TargetLinkLayerAddr(RawHardwareAddress),
    Unknown {
        type_: u8,
        data: &'a [u8],
    },
}

impl<'a> NdiscOption<'a> {
    /// Parse the options trailer of a neighbor discovery message, returning
    /// the consumed options and leftover bytes.
    fn parse_all(mut data: &'a [u8]) -> Result<heapless::Vec<NdiscOption<'a>, 4>> {
        let mut options = heapless::Vec::new();
        while !data.is_empty() {
            if data.len() < 2 {
                return Err(Error);
            }
            let type_ = data[0];
            let len_words = data[1] as usize;
            if len_words == 0 {
                return Err(Error);
            }
            let len = len_words * 8;
            if data.len() < len {
                return Err(Error);
            }
            let body = &data[2..len];
            let option = match OptionType::from(type_) {
                OptionType::SourceLinkLayerAddr => {
                    NdiscOption::SourceLinkLayerAddr(RawHardwareAddress::from_bytes(&body[..6.min(body.len())]))
                }
                OptionType::TargetLinkLayerAddr => {
                    NdiscOption::TargetLinkLayerAddr(RawHardwareAddress::from_bytes(&body[..6.min(body.len())]))
                }
                _ => NdiscOption::Unknown { type_, data: body },
            };
            let _ = options.push(option);
            data = &data[len..];
        }
        Ok(options)
    }

    fn emit(&self, buffer: &mut [u8]) -> usize {
        match self {
            NdiscOption::SourceLinkLayerAddr(addr) => {
                buffer[0] = OptionType::SourceLinkLayerAddr.into();
                buffer[1] = 1;
                buffer[2..8].copy_from_slice(addr.as_bytes());
                8
            }
            NdiscOption::TargetLinkLayerAddr(addr) => {
                buffer[0] = OptionType::TargetLinkLayerAddr.into();
                buffer[1] = 1;
                buffer[2..8].copy_from_slice(addr.as_bytes());
                8
            }
            NdiscOption::Unknown { type_, data } => {
                let len_words = (data.len() + 2).div_ceil(8);
                buffer[0] = *type_;
                buffer[1] = len_words as u8;
                buffer[2..2 + data.len()].copy_from_slice(data);
                len_words * 8
            }
        }
    }

    const fn buffer_len(&self) -> usize {
        match self {
            NdiscOption::SourceLinkLayerAddr(_) | NdiscOption::TargetLinkLayerAddr(_) => 8,
            NdiscOption::Unknown { data, .. } => (data.len() + 2).div_ceil(8) * 8,
        }
    }
}

fn lladdr_of<'a>(options: &[NdiscOption<'a>], target: bool) -> Option<RawHardwareAddress> {
    options.iter().find_map(|opt| match (opt, target) {
        (NdiscOption::SourceLinkLayerAddr(addr), false) => Some(*addr),
        (NdiscOption::TargetLinkLayerAddr(addr), true) => Some(*addr),
        _ => None,
    })
}

/// A high-level representation of an NDISC message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Repr {
    RouterSolicit {
        lladdr: Option<RawHardwareAddress>,
    },
    RouterAdvert {
        hop_limit: u8,
        flags: RouterFlags,
        router_lifetime: Duration,
        reachable_time: Duration,
        retrans_time: Duration,
        lladdr: Option<RawHardwareAddress>,
        mtu: Option<u32>,
    },
    NeighborSolicit {
        target_addr: Ipv6Address,
        lladdr: Option<RawHardwareAddress>,
    },
    NeighborAdvert {
        flags: NeighborFlags,
        target_addr: Ipv6Address,
        lladdr: Option<RawHardwareAddress>,
    },
    Redirect {
        target_addr: Ipv6Address,
        dest_addr: Ipv6Address,
        lladdr: Option<RawHardwareAddress>,
    },
}

impl Repr {
    pub fn msg_type(&self) -> Icmpv6Message {
        match self {
            Repr::RouterSolicit { .. } => Icmpv6Message::RouterSolicit,
            Repr::RouterAdvert { .. } => Icmpv6Message::RouterAdvert,
            Repr::NeighborSolicit { .. } => Icmpv6Message::NeighborSolicit,
            Repr::NeighborAdvert { .. } => Icmpv6Message::NeighborAdvert,
            Repr::Redirect { .. } => Icmpv6Message::Redirect,
        }
    }

    pub fn parse<'a>(packet: &Icmpv6Packet<&'a [u8]>) -> Result<Repr> {
        let payload = packet.payload();
        match packet.msg_type() {
            Icmpv6Message::RouterSolicit => {
                if payload.len() < 4 {
                    return Err(Error);
                }
                let options = NdiscOption::parse_all(&payload[4..])?;
                Ok(Repr::RouterSolicit {
                    lladdr: lladdr_of(&options, false),
                })
            }
            Icmpv6Message::RouterAdvert => {
                if payload.len() < 12 {
                    return Err(Error);
                }
                let options = NdiscOption::parse_all(&payload[12..])?;
                let mtu = options.iter().find_map(|opt| match opt {
                    NdiscOption::Unknown { type_: 5, data } if data.len() >= 6 => {
                        Some(NetworkEndian::read_u32(&data[2..6]))
                    }
                    _ => None,
                });
                Ok(Repr::RouterAdvert {
                    hop_limit: payload[0],
                    flags: RouterFlags::from_bits_truncate(payload[1]),
                    router_lifetime: Duration::from_secs(NetworkEndian::read_u16(&payload[2..4]) as u64),
                    reachable_time: Duration::from_millis(NetworkEndian::read_u32(&payload[4..8]) as u64),
                    retrans_time: Duration::from_millis(NetworkEndian::read_u32(&payload[8..12]) as u64),
                    lladdr: lladdr_of(&options, false),
                    mtu,
                })
            }
            Icmpv6Message::NeighborSolicit => {
                if payload.len() < 20 {
                    return Err(Error);
                }
                let options = NdiscOption::parse_all(&payload[20..])?;
                Ok(Repr::NeighborSolicit {
                    target_addr: Ipv6Address::from(<[u8; 16]>::try_from(&payload[4..20]).unwrap()),
                    lladdr: lladdr_of(&options, false),
                })
            }
            Icmpv6Message::NeighborAdvert => {
                if payload.len() < 20 {
                    return Err(Error);
                }
                let options = NdiscOption::parse_all(&payload[20..])?;
                Ok(Repr::NeighborAdvert {
                    flags: NeighborFlags::from_bits_truncate(payload[0]),
                    target_addr: Ipv6Address::from(<[u8; 16]>::try_from(&payload[4..20]).unwrap()),
                    lladdr: lladdr_of(&options, true),
                })
            }
            Icmpv6Message::Redirect => {
                if payload.len() < 36 {
                    return Err(Error);
                }
                let options = NdiscOption::parse_all(&payload[36..])?;
                Ok(Repr::Redirect {
                    target_addr: Ipv6Address::from(<[u8; 16]>::try_from(&payload[4..20]).unwrap()),
                    dest_addr: Ipv6Address::from(<[u8; 16]>::try_from(&payload[20..36]).unwrap()),
                    lladdr: lladdr_of(&options, true),
                })
            }
            _ => Err(Error),
        }
    }

    pub fn buffer_len(&self) -> usize {
        let lladdr_len = |lladdr: &Option<RawHardwareAddress>| lladdr.map_or(0, |_| 8);
        match self {
            Repr::RouterSolicit { lladdr } => 4 + lladdr_len(lladdr),
            Repr::RouterAdvert { lladdr, mtu, .. } => {
                12 + lladdr_len(lladdr) + mtu.map_or(0, |_| 8)
            }
            Repr::NeighborSolicit { lladdr, .. } => 20 + lladdr_len(lladdr),
            Repr::NeighborAdvert { lladdr, .. } => 20 + lladdr_len(lladdr),
            Repr::Redirect { lladdr, .. } => 36 + lladdr_len(lladdr),
                    }
    }

    pub fn emit(&self, buffer: &mut [u8]) {
        match *self {
            Repr::RouterSolicit { lladdr } => {
                buffer[0..4].fill(0);
                let mut off = 4;
                if let Some(addr) = lladdr {
                    off += NdiscOption::SourceLinkLayerAddr(addr).emit(&mut buffer[off..]);
                }
                let _ = off;
            }
            Repr::RouterAdvert {
                hop_limit,
                flags,
                router_lifetime,
                reachable_time,
                retrans_time,
                lladdr,
                mtu,
            } => {
                buffer[0] = hop_limit;
                buffer[1] = flags.bits();
                NetworkEndian::write_u16(&mut buffer[2..4], router_lifetime.as_secs() as u16);
                NetworkEndian::write_u32(&mut buffer[4..8], reachable_time.as_millis() as u32);
                NetworkEndian::write_u32(&mut buffer[8..12], retrans_time.as_millis() as u32);
                let mut off = 12;
                if let Some(addr) = lladdr {
                    off += NdiscOption::SourceLinkLayerAddr(addr).emit(&mut buffer[off..]);
                }
                if let Some(mtu) = mtu {
                    buffer[off] = OptionType::Mtu.into();
                    buffer[off + 1] = 1;
                    buffer[off + 2..off + 4].fill(0);
                    NetworkEndian::write_u32(&mut buffer[off + 4..off + 8], mtu);
                }
            }
            Repr::NeighborSolicit {
                target_addr,
                lladdr,
            } => {
                buffer[0..4].fill(0);
                buffer[4..20].copy_from_slice(&target_addr.octets());
                if let Some(addr) = lladdr {
                    NdiscOption::SourceLinkLayerAddr(addr).emit(&mut buffer[20..]);
                }
            }
            Repr::NeighborAdvert {
                flags,
                target_addr,
                lladdr,
            } => {
                buffer[0] = flags.bits();
                buffer[1..4].fill(0);
                buffer[4..20].copy_from_slice(&target_addr.octets());
                if let Some(addr) = lladdr {
                    NdiscOption::TargetLinkLayerAddr(addr).emit(&mut buffer[20..]);
                }
            }
            Repr::Redirect {
                target_addr,
                dest_addr,
                lladdr,
            } => {
                buffer[0..4].fill(0);
                buffer[4..20].copy_from_slice(&target_addr.octets());
                buffer[20..36].copy_from_slice(&dest_addr.octets());
                if let Some(addr) = lladdr {
                    NdiscOption::TargetLinkLayerAddr(addr).emit(&mut buffer[36..]);
                }
            }
                    }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Repr::RouterSolicit { .. } => write!(f, "NDISC router solicitation"),
            Repr::RouterAdvert { .. } => write!(f, "NDISC router advertisement"),
            Repr::NeighborSolicit { target_addr, .. } => {
                write!(f, "NDISC neighbor solicitation target={target_addr}")
            }
            Repr::NeighborAdvert { target_addr, .. } => {
                write!(f, "NDISC neighbor advertisement target={target_addr}")
            }
            Repr::Redirect { target_addr, .. } => write!(f, "NDISC redirect target={target_addr}"),
                    }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::ChecksumCapabilities;
    use crate::wire::{IpAddress, Icmpv6Repr};

    #[test]
    fn neighbor_solicit_roundtrips() {
        let lladdr = RawHardwareAddress::from_bytes(&[1, 2, 3, 4, 5, 6]);
        let repr = Repr::NeighborSolicit {
            target_addr: Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1),
            lladdr: Some(lladdr),
        };
        let icmp_repr = Icmpv6Repr::Ndisc(repr);
        let mut buf = vec![0u8; icmp_repr.buffer_len()];
        let src = IpAddress::Ipv6(Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 2));
        let dst = IpAddress::Ipv6(Ipv6Address::new(0xff02, 0, 0, 0, 0, 0, 1, 0xff00));
        icmp_repr.emit(
            &src,
            &dst,
            &mut Icmpv6Packet::new_unchecked(&mut buf),
            &ChecksumCapabilities::default(),
        );

        let packet = Icmpv6Packet::new_checked(&buf[..]).unwrap();
        let parsed = Icmpv6Repr::parse(&packet, &src, &dst, &ChecksumCapabilities::default()).unwrap();
        assert_eq!(parsed, icmp_repr);
    }
}
