use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

use super::ip::checksum;
use super::{Error, Ipv4Packet, Ipv4Repr, Result};
use crate::phy::ChecksumCapabilities;

enum_with_unknown! {
    /// Internet protocol control message type.
    pub enum Message(u8) {
        EchoReply        = 0,
        DstUnreachable   = 3,
        Redirect         = 5,
        EchoRequest      = 8,
        TimeExceeded     = 11,
        ParamProblem     = 12,
        Timestamp        = 13,
        TimestampReply   = 14
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Message::EchoReply => write!(f, "echo reply"),
            Message::DstUnreachable => write!(f, "destination unreachable"),
            Message::Redirect => write!(f, "message redirect"),
            Message::EchoRequest => write!(f, "echo request"),
            Message::TimeExceeded => write!(f, "time exceeded"),
            Message::ParamProblem => write!(f, "parameter problem"),
            Message::Timestamp => write!(f, "timestamp"),
            Message::TimestampReply => write!(f, "timestamp reply"),
            Message::Unknown(id) => write!(f, "{id}"),
        }
    }
}

enum_with_unknown! {
    /// Internet protocol control message subtype for type "Destination Unreachable".
    pub enum DstUnreachable(u8) {
        /// Destination network unreachable
        NetUnreachable   =  0,
        /// Destination host unreachable
        HostUnreachable  =  1,
        /// Destination protocol unreachable
        ProtoUnreachable =  2,
        /// Destination port unreachable
        PortUnreachable  =  3,
        /// Fragmentation required, and DF flag set
        FragRequired     =  4,
        /// Source route failed
        SrcRouteFailed   =  5,
        /// Destination network unknown
        DstNetUnknown    =  6,
        /// Destination host unknown
        DstHostUnknown   =  7,
        /// Source host isolated
        SrcHostIsolated  =  8,
        /// Network administratively prohibited
        NetProhibited    =  9,
        /// Host administratively prohibited
        HostProhibited   = 10,
        /// Network unreachable for ToS
        NetUnreachToS    = 11,
        /// Host unreachable for ToS
        HostUnreachToS   = 12,
        /// Communication administratively prohibited
        CommProhibited   = 13,
        /// Host precedence violation
        HostPrecedViol   = 14,
        /// Precedence cutoff in effect
        PrecedCutoff     = 15
    }
}

enum_with_unknown! {
    /// Internet protocol control message subtype for type "Time Exceeded".
    pub enum TimeExceeded(u8) {
        /// TTL expired in transit
        TtlExpired  = 0,
        /// Fragment reassembly time exceeded
        FragExpired = 1
    }
}

enum_with_unknown! {
    /// Internet protocol control message subtype for type "Parameter Problem".
    pub enum ParamProblem(u8) {
        AtPointer         = 0,
        MissingOption     = 1,
        BadLength         = 2
    }
}

enum_with_unknown! {
    /// Internet protocol control message subtype for type "Redirect".
    pub enum Redirect(u8) {
        Network       = 0,
        Host          = 1,
        TosNetwork    = 2,
        TosHost       = 3
    }
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::*;

    pub const TYPE: usize = 0;
    pub const CODE: usize = 1;
    pub const CHECKSUM: Field = 2..4;

    pub const UNUSED: Field = 4..8;
    pub const ECHO_IDENT: Field = 4..6;
    pub const ECHO_SEQNO: Field = 6..8;

    pub const HEADER_END: usize = 8;
}

pub const HEADER_LEN: usize = field::HEADER_END;

/// A read/write wrapper around an ICMPv4 packet buffer.
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

    pub fn verify_checksum(&self) -> bool {
        checksum::data(self.buffer.as_ref()) == !0
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

    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = !checksum::data(self.buffer.as_ref());
        self.set_checksum(checksum)
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

/// A high-level representation of an Internet Control Message Protocol version 4 packet header.
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
        header: Ipv4Repr,
        data: &'a [u8],
    },
    TimeExceeded {
        reason: TimeExceeded,
        header: Ipv4Repr,
        data: &'a [u8],
    },
    ParamProblem {
        reason: ParamProblem,
        pointer: u8,
        header: Ipv4Repr,
        data: &'a [u8],
    },
    Redirect {
        reason: Redirect,
        new_addr: super::Ipv4Address,
        header: Ipv4Repr,
        data: &'a [u8],
    },
}

/// Quote at most this many octets of the offending datagram in an error reply,
/// matching the conventional minimal quote used by most ICMP implementations.
const QUOTE_MAX: usize = 68;

impl<'a> Repr<'a> {
    pub fn parse(
        packet: &Packet<&'a [u8]>,
        checksum_caps: &ChecksumCapabilities,
    ) -> Result<Repr<'a>> {
        packet.check_len()?;
        if checksum_caps.icmpv4.rx() && !packet.verify_checksum() {
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
                let (header, data) = parse_quoted_header(packet.payload())?;
                Ok(Repr::DstUnreachable {
                    reason: DstUnreachable::from(code),
                    header,
                    data,
                })
            }
            (Message::TimeExceeded, code) => {
                let (header, data) = parse_quoted_header(packet.payload())?;
                Ok(Repr::TimeExceeded {
                    reason: TimeExceeded::from(code),
                    header,
                    data,
                })
            }
            (Message::ParamProblem, code) => {
                let pointer = NetworkEndian::read_u16(&packet.payload()[0..2]) as u8;
                let (header, data) = parse_quoted_header(&packet.payload()[4..])?;
                Ok(Repr::ParamProblem {
                    reason: ParamProblem::from(code),
                    pointer,
                    header,
                    data,
                })
            }
            (Message::Redirect, code) => {
                let new_addr = super::Ipv4Address::from_bytes(&packet.payload()[0..4]);
                let (header, data) = parse_quoted_header(&packet.payload()[4..])?;
                Ok(Repr::Redirect {
                    reason: Redirect::from(code),
                    new_addr,
                    header,
                    data,
                })
            }
            _ => Err(Error),
        }
    }

    pub fn buffer_len(&self) -> usize {
        match self {
            &Repr::EchoRequest { data, .. } | &Repr::EchoReply { data, .. } => {
                field::ECHO_SEQNO.end + data.len()
            }
            &Repr::DstUnreachable { header, data, .. } | &Repr::TimeExceeded { header, data, .. } => {
                field::UNUSED.end + header.buffer_len() + data.len()
            }
            &Repr::ParamProblem { header, data, .. } | &Repr::Redirect { header, data, .. } => {
                field::UNUSED.end + header.buffer_len() + data.len()
            }
        }
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(
        &self,
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
                emit_quoted(packet.payload_mut(), header, data);
            }
            Repr::TimeExceeded {
                reason,
                header,
                data,
            } => {
                packet.set_msg_type(Message::TimeExceeded);
                packet.set_msg_code(reason.into());
                emit_quoted(packet.payload_mut(), header, data);
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
                payload[0] = pointer;
                payload[1] = 0;
                payload[2] = 0;
                payload[3] = 0;
                emit_quoted(&mut payload[4..], header, data);
            }
            Repr::Redirect {
                reason,
                new_addr,
                header,
                data,
            } => {
                packet.set_msg_type(Message::Redirect);
                packet.set_msg_code(reason.into());
                let payload = packet.payload_mut();
                payload[0..4].copy_from_slice(&new_addr.octets());
                emit_quoted(&mut payload[4..], header, data);
            }
        }

        if checksum_caps.icmpv4.tx() {
            packet.fill_checksum();
        } else {
            packet.set_checksum(0);
        }
    }
}

fn parse_quoted_header(data: &[u8]) -> Result<(Ipv4Repr, &[u8])> {
    let ip_packet = Ipv4Packet::new_checked(data)?;
    let header = Ipv4Repr::parse(&ip_packet, &ChecksumCapabilities::ignored())?;
    let header_len = header.buffer_len();
    Ok((header, &data[header_len..]))
}

fn emit_quoted(buffer: &mut [u8], header: Ipv4Repr, data: &[u8]) {
    buffer[0..4].fill(0);
    let header_len = header.buffer_len();
    header.emit(
        &mut Ipv4Packet::new_unchecked(&mut buffer[4..4 + header_len]),
        &ChecksumCapabilities::ignored(),
    );
    let quote = &data[..data.len().min(QUOTE_MAX)];
    buffer[4 + header_len..4 + header_len + quote.len()].copy_from_slice(quote);
}

impl<'a> fmt::Display for Repr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Repr::EchoRequest { ident, seq_no, .. } => {
                write!(f, "ICMPv4 echo request ident={ident} seq={seq_no}")
            }
            Repr::EchoReply { ident, seq_no, .. } => {
                write!(f, "ICMPv4 echo reply ident={ident} seq={seq_no}")
            }
            Repr::DstUnreachable { reason, .. } => {
                write!(f, "ICMPv4 destination unreachable ({reason})")
            }
            Repr::TimeExceeded { reason, .. } => write!(f, "ICMPv4 time exceeded ({reason})"),
            Repr::ParamProblem { reason, .. } => write!(f, "ICMPv4 parameter problem ({reason})"),
            Repr::Redirect { reason, .. } => write!(f, "ICMPv4 redirect ({reason})"),
        }
    }
}

impl fmt::Display for DstUnreachable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl fmt::Display for TimeExceeded {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl fmt::Display for ParamProblem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

use crate::wire::pretty_print::{PrettyIndent, PrettyPrint};

impl<T: AsRef<[u8]>> PrettyPrint for Packet<T> {
    fn pretty_print(buffer: &dyn AsRef<[u8]>, f: &mut fmt::Formatter, indent: &mut PrettyIndent) -> fmt::Result {
        match Packet::new_checked(buffer.as_ref()) {
            Err(err) => write!(f, "{indent}({err})"),
            Ok(packet) => match Repr::parse(&packet, &ChecksumCapabilities::default()) {
                Err(err) => write!(f, "{indent}({err})"),
                Ok(repr) => write!(f, "{indent}{repr}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_request_roundtrips() {
        let repr = Repr::EchoRequest {
            ident: 1,
            seq_no: 2,
            data: &[1, 2, 3, 4],
        };
        let mut buf = vec![0u8; repr.buffer_len()];
        let caps = ChecksumCapabilities::default();
        repr.emit(&mut Packet::new_unchecked(&mut buf), &caps);

        let packet = Packet::new_checked(&buf[..]).unwrap();
        assert!(packet.verify_checksum());
        assert_eq!(Repr::parse(&packet, &caps).unwrap(), repr);
    }

    #[test]
    fn dst_unreachable_quotes_header() {
        let inner_header = Ipv4Repr {
            src_addr: super::super::Ipv4Address::new(10, 0, 0, 1),
            dst_addr: super::super::Ipv4Address::new(10, 0, 0, 2),
            next_header: crate::wire::IpProtocol::Udp,
            payload_len: 8,
            hop_limit: 64,
        };
        let repr = Repr::DstUnreachable {
            reason: DstUnreachable::PortUnreachable,
            header: inner_header,
            data: &[0; 8],
        };
        let mut buf = vec![0u8; repr.buffer_len()];
        let caps = ChecksumCapabilities::default();
        repr.emit(&mut Packet::new_unchecked(&mut buf), &caps);
        let packet = Packet::new_checked(&buf[..]).unwrap();
        let parsed = Repr::parse(&packet, &caps).unwrap();
        match parsed {
            Repr::DstUnreachable { reason, header, .. } => {
                assert_eq!(reason, DstUnreachable::PortUnreachable);
                assert_eq!(header, inner_header);
            }
            _ => panic!("wrong variant"),
        }
    }
}
