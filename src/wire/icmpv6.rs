use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

use super::ip::checksum;
use super::{Error, IpAddress, IpProtocol, Ipv6Packet, Ipv6Repr, Result};
use crate::phy::ChecksumCapabilities;
use crate::wire::ndisc::Repr as NdiscRepr;

enum_with_unknown! {
    /// Internet protocol control message type.
    pub enum Message(u8) {
        DstUnreachable   = 0x01,
        PktTooBig        = 0x02,
        TimeExceeded     = 0x03,
        ParamProblem     = 0x04,
        EchoRequest      = 0x80,
        EchoReply        = 0x81,
        RouterSolicit    = 0x85,
        RouterAdvert     = 0x86,
        NeighborSolicit  = 0x87,
        NeighborAdvert   = 0x88,
        Redirect         = 0x89
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Message::DstUnreachable => write!(f, "destination unreachable"),
            Message::PktTooBig => write!(f, "packet too big"),
            Message::TimeExceeded => write!(f, "time exceeded"),
            Message::ParamProblem => write!(f, "parameter problem"),
            Message::EchoRequest => write!(f, "echo request"),
            Message::EchoReply => write!(f, "echo reply"),
            Message::RouterSolicit => write!(f, "router solicitation"),
            Message::RouterAdvert => write!(f, "router advertisement"),
            Message::NeighborSolicit => write!(f, "neighbor solicitation"),
            Message::NeighborAdvert => write!(f, "neighbor advertisement"),
            Message::Redirect => write!(f, "redirect"),
            Message::Unknown(id) => write!(f, "{id}"),
        }
    }
}

enum_with_unknown! {
    pub enum DstUnreachable(u8) {
        NoRoute           = 0,
        AdminProhibit     = 1,
        BeyondScope       = 2,
        AddrUnreachable   = 3,
        PortUnreachable   = 4,
        FailedPolicy      = 5,
        RejectRoute       = 6
    }
}

enum_with_unknown! {
    pub enum TimeExceeded(u8) {
        HopLimitExceeded   = 0,
        FragReassemExceeded = 1
    }
}

enum_with_unknown! {
    pub enum ParamProblem(u8) {
        ErroneousHeader        = 0,
        UnrecognizedNextHeader = 1,
        UnrecognizedOption     = 2
    }
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::*;

    pub const TYPE: usize = 0;
    pub const CODE: usize = 1;
    pub const CHECKSUM: Field = 2..4;

    pub const ECHO_IDENT: Field = 4..6;
    pub const ECHO_SEQNO: Field = 6..8;

    pub const HEADER_END: usize = 8;
}

pub const HEADER_LEN: usize = field::HEADER_END;

/// A read/write wrapper around an ICMPv6 packet buffer.
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
        if self.buffer.as_ref().len() < field::HEADER_END {
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

    pub fn msg_code(&self) -> u8 {
        self.buffer.as_ref()[field::CODE]
    }

    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::CHECKSUM])
    }

    pub fn echo_ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::ECHO_IDENT])
    }

    pub fn echo_seq_no(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::ECHO_SEQNO])
    }

    pub fn verify_checksum(&self, src_addr: &IpAddress, dst_addr: &IpAddress) -> bool {
        let data = self.buffer.as_ref();
        checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Icmpv6, data.len() as u32),
            checksum::data(data),
        ]) == !0
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer.as_ref()[field::HEADER_END..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_msg_type(&mut self, value: Message) {
        self.buffer.as_mut()[field::TYPE] = value.into();
    }

    pub fn set_msg_code(&mut self, value: u8) {
        self.buffer.as_mut()[field::CODE] = value;
    }

    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CHECKSUM], value);
    }

    pub fn set_echo_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::ECHO_IDENT], value);
    }

    pub fn set_echo_seq_no(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::ECHO_SEQNO], value);
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[field::HEADER_END..]
    }

    pub fn fill_checksum(&mut self, src_addr: &IpAddress, dst_addr: &IpAddress) {
        self.set_checksum(0);
        let checksum = {
            let data = self.buffer.as_ref();
            !checksum::combine(&[
                checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Icmpv6, data.len() as u32),
                checksum::data(data),
            ])
        };
        self.set_checksum(checksum)
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

const QUOTE_MAX: usize = 68;

/// A high-level representation of an Internet Control Message Protocol version 6 packet header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum Repr<'a> {
    EchoRequest {
        ident: u16,
        seq_no: u16,
        data: &'a [u8],
    },
    EchoReply {
        ident: u16,
        seq_no: u16,
        data: &'a [u8],
    },
    DstUnreachable {
        reason: DstUnreachable,
        header: Ipv6Repr,
        data: &'a [u8],
    },
    PktTooBig {
        mtu: u32,
        header: Ipv6Repr,
        data: &'a [u8],
    },
    TimeExceeded {
        reason: TimeExceeded,
        header: Ipv6Repr,
        data: &'a [u8],
    },
    ParamProblem {
        reason: ParamProblem,
        pointer: u32,
        header: Ipv6Repr,
        data: &'a [u8],
    },
    Ndisc(NdiscRepr),
}

impl<'a> Repr<'a> {
    pub fn parse(
        packet: &Packet<&'a [u8]>,
        src_addr: &IpAddress,
        dst_addr: &IpAddress,
        checksum_caps: &ChecksumCapabilities,
    ) -> Result<Repr<'a>> {
        packet.check_len()?;
        if checksum_caps.icmpv6.rx() && !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error);
        }

        match (packet.msg_type(), packet.msg_code()) {
            (Message::EchoRequest, 0) => Ok(Repr::EchoRequest {
                ident: packet.echo_ident(),
                seq_no: packet.echo_seq_no(),
                data: packet.payload(),
            }),
            (Message::EchoReply, 0) => Ok(Repr::EchoReply {
                ident: packet.echo_ident(),
                seq_no: packet.echo_seq_no(),
                data: packet.payload(),
            }),
            (Message::DstUnreachable, code) => {
                let (header, data) = parse_quoted_header(&packet.payload()[4..])?;
                Ok(Repr::DstUnreachable {
                    reason: DstUnreachable::from(code),
                    header,
                    data,
                })
            }
            (Message::PktTooBig, 0) => {
                let mtu = NetworkEndian::read_u32(&packet.payload()[0..4]);
                let (header, data) = parse_quoted_header(&packet.payload()[4..])?;
                Ok(Repr::PktTooBig { mtu, header, data })
            }
            (Message::TimeExceeded, code) => {
                let (header, data) = parse_quoted_header(&packet.payload()[4..])?;
                Ok(Repr::TimeExceeded {
                    reason: TimeExceeded::from(code),
                    header,
                    data,
                })
            }
            (Message::ParamProblem, code) => {
                let pointer = NetworkEndian::read_u32(&packet.payload()[0..4]);
                let (header, data) = parse_quoted_header(&packet.payload()[4..])?;
                Ok(Repr::ParamProblem {
                    reason: ParamProblem::from(code),
                    pointer,
                    header,
                    data,
                })
            }
            (Message::RouterSolicit, _)
            | (Message::RouterAdvert, _)
            | (Message::NeighborSolicit, _)
            | (Message::NeighborAdvert, _)
            | (Message::Redirect, _) => Ok(Repr::Ndisc(NdiscRepr::parse(packet)?)),
            _ => Err(Error),
        }
    }

    pub fn buffer_len(&self) -> usize {
        match self {
            &Repr::EchoRequest { data, .. } | &Repr::EchoReply { data, .. } => {
                field::ECHO_SEQNO.end + data.len()
            }
            &Repr::DstUnreachable { header, data, .. } | &Repr::TimeExceeded { header, data, .. } => {
                field::HEADER_END + 4 + header.buffer_len() + data.len().min(QUOTE_MAX)
            }
            &Repr::PktTooBig { header, data, .. } | &Repr::ParamProblem { header, data, .. } => {
                field::HEADER_END + 4 + header.buffer_len() + data.len().min(QUOTE_MAX)
            }
            Repr::Ndisc(repr) => field::HEADER_END + repr.buffer_len(),
        }
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(
        &self,
        src_addr: &IpAddress,
        dst_addr: &IpAddress,
        packet: &mut Packet<&mut T>,
        checksum_caps: &ChecksumCapabilities,
    ) {
        packet.set_msg_code(0);
        match *self {
            Repr::EchoRequest {
                ident,
                seq_no,
                data,
            } => {
                packet.set_msg_type(Message::EchoRequest);
                packet.set_echo_ident(ident);
                packet.set_echo_seq_no(seq_no);
                packet.payload_mut()[..data.len()].copy_from_slice(data);
            }
            Repr::EchoReply {
                ident,
                seq_no,
                data,
            } => {
                packet.set_msg_type(Message::EchoReply);
                packet.set_echo_ident(ident);
                packet.set_echo_seq_no(seq_no);
                packet.payload_mut()[..data.len()].copy_from_slice(data);
            }
            Repr::DstUnreachable {
                reason,
                header,
                data,
            } => {
                packet.set_msg_type(Message::DstUnreachable);
                packet.set_msg_code(reason.into());
                let payload = packet.payload_mut();
                payload[0..4].fill(0);
                emit_quoted(&mut payload[4..], header, data);
            }
            Repr::PktTooBig { mtu, header, data } => {
                packet.set_msg_type(Message::PktTooBig);
                let payload = packet.payload_mut();
                NetworkEndian::write_u32(&mut payload[0..4], mtu);
                emit_quoted(&mut payload[4..], header, data);
            }
            Repr::TimeExceeded {
                reason,
                header,
                data,
            } => {
                packet.set_msg_type(Message::TimeExceeded);
                packet.set_msg_code(reason.into());
                let payload = packet.payload_mut();
                payload[0..4].fill(0);
                emit_quoted(&mut payload[4..], header, data);
            }
            Repr::ParamProblem {
                reason,
                pointer,
                header,
                data,
            } => {
                packet.set_msg_type(Message::ParamProblem);
                packet.set_msg_code(reason.into());
                let payload = packet.payload_mut();
                NetworkEndian::write_u32(&mut payload[0..4], pointer);
                emit_quoted(&mut payload[4..], header, data);
            }
            Repr::Ndisc(repr) => {
                packet.set_msg_type(repr.msg_type());
                repr.emit(&mut packet.payload_mut()[..repr.buffer_len()]);
            }
        }

        if checksum_caps.icmpv6.tx() {
            packet.fill_checksum(src_addr, dst_addr);
        } else {
            packet.set_checksum(0);
        }
    }
}

fn parse_quoted_header(data: &[u8]) -> Result<(Ipv6Repr, &[u8])> {
    let ip_packet = Ipv6Packet::new_checked(data)?;
    let header = Ipv6Repr::parse(&ip_packet)?;
    let header_len = header.buffer_len();
    Ok((header, &data[header_len..]))
}

fn emit_quoted(buffer: &mut [u8], header: Ipv6Repr, data: &[u8]) {
    let header_len = header.buffer_len();
    header.emit(&mut Ipv6Packet::new_unchecked(&mut buffer[..header_len]));
    let quote = &data[..data.len().min(QUOTE_MAX)];
    buffer[header_len..header_len + quote.len()].copy_from_slice(quote);
}

impl<'a> fmt::Display for Repr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Repr::EchoRequest { ident, seq_no, .. } => {
                write!(f, "ICMPv6 echo request ident={ident} seq={seq_no}")
            }
            Repr::EchoReply { ident, seq_no, .. } => {
                write!(f, "ICMPv6 echo reply ident={ident} seq={seq_no}")
            }
            Repr::DstUnreachable { reason, .. } => {
                write!(f, "ICMPv6 destination unreachable ({reason:?})")
            }
            Repr::PktTooBig { mtu, .. } => write!(f, "ICMPv6 packet too big (mtu={mtu})"),
            Repr::TimeExceeded { reason, .. } => write!(f, "ICMPv6 time exceeded ({reason:?})"),
            Repr::ParamProblem { reason, .. } => write!(f, "ICMPv6 parameter problem ({reason:?})"),
            Repr::Ndisc(repr) => write!(f, "{repr}"),
        }
    }
}

use crate::wire::pretty_print::{PrettyIndent, PrettyPrint};

impl<T: AsRef<[u8]>> PrettyPrint for Packet<T> {
    fn pretty_print(buffer: &dyn AsRef<[u8]>, f: &mut fmt::Formatter, indent: &mut PrettyIndent) -> fmt::Result {
        write!(f, "{indent}ICMPv6 len={}", buffer.as_ref().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Ipv6Address;

    #[test]
    fn echo_roundtrips() {
        let src = IpAddress::Ipv6(Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1));
        let dst = IpAddress::Ipv6(Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 2));
        let repr = Repr::EchoRequest {
            ident: 5,
            seq_no: 1,
            data: &[1, 2, 3],
        };
        let mut buf = vec![0u8; repr.buffer_len()];
        let caps = ChecksumCapabilities::default();
        repr.emit(&src, &dst, &mut Packet::new_unchecked(&mut buf), &caps);

        let packet = Packet::new_checked(&buf[..]).unwrap();
        assert!(packet.verify_checksum(&src, &dst));
        assert_eq!(Repr::parse(&packet, &src, &dst, &caps).unwrap(), repr);
    }
}
