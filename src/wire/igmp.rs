//! IGMPv2 (RFC 2236) membership message representation.
//!
//! Used for IPv4 multicast group membership bookkeeping only; full router
//! querier behavior and IGMPv3 source filtering are not implemented.

use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use core::time::Duration;

use super::ip::checksum;
use super::{Error, Ipv4Address, Ipv4AddressExt, Result};

enum_with_unknown! {
    pub enum Message(u8) {
        MembershipQuery  = 0x11,
        MembershipReportV1 = 0x12,
        MembershipReportV2 = 0x16,
        LeaveGroup       = 0x17
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Message::MembershipQuery => write!(f, "membership query"),
            Message::MembershipReportV1 => write!(f, "v1 membership report"),
            Message::MembershipReportV2 => write!(f, "v2 membership report"),
            Message::LeaveGroup => write!(f, "leave group"),
            Message::Unknown(id) => write!(f, "{id}"),
        }
    }
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::*;

    pub const TYPE: usize = 0;
    pub const MAX_RESP_TIME: usize = 1;
    pub const CHECKSUM: Field = 2..4;
    pub const GROUP_ADDR: Field = 4..8;
}

pub const HEADER_LEN: usize = field::GROUP_ADDR.end;

/// A read/write wrapper around an IGMPv2 packet buffer.
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
        if self.buffer.as_ref().len() < HEADER_LEN {
            Err(Error)
        } else {
            Ok(())
        }
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    pub fn msg_type(&self) -> Message {
        Message::from(self.buffer.as_ref()[field::TYPE])
    }

    pub fn max_resp_time(&self) -> Duration {
        Duration::from_millis(self.buffer.as_ref()[field::MAX_RESP_TIME] as u64 * 100)
    }

    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::CHECKSUM])
    }

    pub fn group_addr(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[field::GROUP_ADDR])
    }

    pub fn verify_checksum(&self) -> bool {
        checksum::data(&self.buffer.as_ref()[..HEADER_LEN]) == !0
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_msg_type(&mut self, value: Message) {
        self.buffer.as_mut()[field::TYPE] = value.into();
    }

    pub fn set_max_resp_time(&mut self, value: Duration) {
        self.buffer.as_mut()[field::MAX_RESP_TIME] = (value.as_millis() / 100) as u8;
    }

    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CHECKSUM], value);
    }

    pub fn set_group_addr(&mut self, value: Ipv4Address) {
        self.buffer.as_mut()[field::GROUP_ADDR].copy_from_slice(&value.octets());
    }

    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = !checksum::data(&self.buffer.as_ref()[..HEADER_LEN]);
        self.set_checksum(checksum)
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A high-level representation of an IGMPv2 membership message.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Repr {
    MembershipQuery {
        max_resp_time: Duration,
        group_addr: Ipv4Address,
    },
    MembershipReportV2 {
        group_addr: Ipv4Address,
    },
    LeaveGroup {
        group_addr: Ipv4Address,
    },
}

impl Repr {
    pub fn parse(packet: &Packet<&[u8]>) -> Result<Repr> {
        packet.check_len()?;
        if !packet.verify_checksum() {
            return Err(Error);
        }
        match packet.msg_type() {
            Message::MembershipQuery => Ok(Repr::MembershipQuery {
                max_resp_time: packet.max_resp_time(),
                group_addr: packet.group_addr(),
            }),
            Message::MembershipReportV1 | Message::MembershipReportV2 => {
                Ok(Repr::MembershipReportV2 {
                    group_addr: packet.group_addr(),
                })
            }
            Message::LeaveGroup => Ok(Repr::LeaveGroup {
                group_addr: packet.group_addr(),
            }),
            Message::Unknown(_) => Err(Error),
        }
    }

    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(&self, packet: &mut Packet<&mut T>) {
        match *self {
            Repr::MembershipQuery {
                max_resp_time,
                group_addr,
            } => {
                packet.set_msg_type(Message::MembershipQuery);
                packet.set_max_resp_time(max_resp_time);
                packet.set_group_addr(group_addr);
            }
            Repr::MembershipReportV2 { group_addr } => {
                packet.set_msg_type(Message::MembershipReportV2);
                packet.set_max_resp_time(Duration::ZERO);
                packet.set_group_addr(group_addr);
            }
            Repr::LeaveGroup { group_addr } => {
                packet.set_msg_type(Message::LeaveGroup);
                packet.set_max_resp_time(Duration::ZERO);
                packet.set_group_addr(group_addr);
            }
        }
        packet.fill_checksum();
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Repr::MembershipQuery { group_addr, .. } => {
                write!(f, "IGMPv2 membership query group={group_addr}")
            }
            Repr::MembershipReportV2 { group_addr } => {
                write!(f, "IGMPv2 membership report group={group_addr}")
            }
            Repr::LeaveGroup { group_addr } => write!(f, "IGMPv2 leave group={group_addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_roundtrips() {
        let repr = Repr::MembershipReportV2 {
            group_addr: Ipv4Address::new(224, 0, 0, 251),
        };
        let mut buf = [0u8; HEADER_LEN];
        repr.emit(&mut Packet::new_unchecked(&mut buf));
        let packet = Packet::new_checked(&buf[..]).unwrap();
        assert!(packet.verify_checksum());
        assert_eq!(Repr::parse(&packet).unwrap(), repr);
    }
}
