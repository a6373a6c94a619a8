use byteorder::{ByteOrder, NetworkEndian};
use core::cmp::Ordering;
use core::fmt;
use core::ops;

use super::ip::checksum;
use super::{Error, IpAddress, IpProtocol, Result};
use crate::phy::ChecksumCapabilities;

/// A TCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo 2**32. Rather
/// than comparing sequence numbers directly, any signed arithmetic must be done
/// on the difference between a pair of numbers, in 32-bit arithmetic. For example,
/// to check if a sequence number `a` is before a sequence number `b`, one needs to
/// check if `a - b < 0`.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct SeqNumber(pub i32);

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs as i32))
    }
}

impl ops::Sub<usize> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_sub(rhs as i32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        self.0 = self.0.wrapping_add(rhs as i32);
    }
}

impl ops::Sub<SeqNumber> for SeqNumber {
    type Output = usize;

    fn sub(self, rhs: SeqNumber) -> usize {
        let result = self.0.wrapping_sub(rhs.0);
        assert!(result >= 0, "attempt to subtract with underflow");
        result as usize
    }
}

impl PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.0.wrapping_sub(other.0).cmp(&0))
    }
}

impl SeqNumber {
    /// Return `true` if `self` falls strictly between `start` and `end`,
    /// on the wraparound-aware sequence-number line.
    pub fn in_range(self, start: SeqNumber, end: SeqNumber) -> bool {
        start <= self && self < end
    }
}

enum_with_unknown! {
    /// TCP control flags.
    pub enum Control(u8) {
        None = 0x00,
        Syn  = 0x01,
        Fin  = 0x02,
        Rst  = 0x03,
        Psh  = 0x04
    }
}

impl Control {
    /// Return the length of a control flag, in sequence space.
    pub const fn len(self) -> usize {
        match self {
            Control::Syn | Control::Fin => 1,
            _ => 0,
        }
    }
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::*;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const SEQ_NUM: Field = 4..8;
    pub const ACK_NUM: Field = 8..12;
    pub const FLAGS: Field = 12..14;
    pub const WINDOW: Field = 14..16;
    pub const CHECKSUM: Field = 16..18;
    pub const URGENT: Field = 18..20;

    pub const fn OPTIONS(data_offset: u8) -> Field {
        URGENT.end..(data_offset as usize * 4)
    }

    pub const FLG_FIN: u16 = 0x001;
    pub const FLG_SYN: u16 = 0x002;
    pub const FLG_RST: u16 = 0x004;
    pub const FLG_PSH: u16 = 0x008;
    pub const FLG_ACK: u16 = 0x010;
    pub const FLG_URG: u16 = 0x020;
    pub const FLG_ECE: u16 = 0x040;
    pub const FLG_CWR: u16 = 0x080;
    pub const FLG_NS: u16 = 0x100;
}

pub const HEADER_LEN: usize = field::URGENT.end;

/// A read/write wrapper around a Transmission Control Protocol packet buffer.
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
        if len < HEADER_LEN {
            return Err(Error);
        }
        let data_offset = self.data_offset();
        if data_offset < 5 || (data_offset as usize) * 4 > len {
            return Err(Error);
        }
        Ok(())
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::SRC_PORT])
    }

    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::DST_PORT])
    }

    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.buffer.as_ref()[field::SEQ_NUM]))
    }

    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_i32(&self.buffer.as_ref()[field::ACK_NUM]))
    }

    pub fn data_offset(&self) -> u8 {
        self.buffer.as_ref()[field::FLAGS.start] >> 4
    }

    fn raw_flags(&self) -> u16 {
        let data = self.buffer.as_ref();
        let raw = (u16::from(data[field::FLAGS.start] & 0x0f) << 8) | u16::from(data[field::FLAGS.start + 1]);
        raw
    }

    pub fn fin(&self) -> bool {
        self.raw_flags() & field::FLG_FIN != 0
    }

    pub fn syn(&self) -> bool {
        self.raw_flags() & field::FLG_SYN != 0
    }

    pub fn rst(&self) -> bool {
        self.raw_flags() & field::FLG_RST != 0
    }

    pub fn psh(&self) -> bool {
        self.raw_flags() & field::FLG_PSH != 0
    }

    pub fn ack(&self) -> bool {
        self.raw_flags() & field::FLG_ACK != 0
    }

    pub fn urg(&self) -> bool {
        self.raw_flags() & field::FLG_URG != 0
    }

    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::WINDOW])
    }

    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::CHECKSUM])
    }

    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::URGENT])
    }

    /// Return the control flag as a single value, to use in processing logic.
    pub fn control(&self) -> Control {
        match (self.syn(), self.fin(), self.rst()) {
            (false, false, false) => Control::None,
            (true, false, false) => Control::Syn,
            (false, true, false) => Control::Fin,
            (false, false, true) => Control::Rst,
            _ => Control::None,
        }
    }

    pub fn verify_checksum(&self, src_addr: &IpAddress, dst_addr: &IpAddress) -> bool {
        let data = self.buffer.as_ref();
        checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Tcp, data.len() as u32),
            checksum::data(data),
        ]) == !0
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    pub fn options(&self) -> &'a [u8] {
        let range = field::OPTIONS(self.data_offset());
        &self.buffer.as_ref()[range]
    }

    pub fn payload(&self) -> &'a [u8] {
        let len = self.buffer.as_ref().len();
        &self.buffer.as_ref()[self.data_offset() as usize * 4..len]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::SRC_PORT], value);
    }

    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::DST_PORT], value);
    }

    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.buffer.as_mut()[field::SEQ_NUM], value.0);
    }

    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_i32(&mut self.buffer.as_mut()[field::ACK_NUM], value.0);
    }

    pub fn set_data_offset(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::FLAGS.start] = (data[field::FLAGS.start] & 0x0f) | (value << 4);
    }

    fn set_raw_flags(&mut self, raw: u16) {
        let data = self.buffer.as_mut();
        data[field::FLAGS.start] = (data[field::FLAGS.start] & 0xf0) | ((raw >> 8) as u8 & 0x0f);
        data[field::FLAGS.start + 1] = raw as u8;
    }

    pub fn set_fin(&mut self, value: bool) {
        let raw = self.raw_flags();
        self.set_raw_flags(if value { raw | field::FLG_FIN } else { raw & !field::FLG_FIN });
    }

    pub fn set_syn(&mut self, value: bool) {
        let raw = self.raw_flags();
        self.set_raw_flags(if value { raw | field::FLG_SYN } else { raw & !field::FLG_SYN });
    }

    pub fn set_rst(&mut self, value: bool) {
        let raw = self.raw_flags();
        self.set_raw_flags(if value { raw | field::FLG_RST } else { raw & !field::FLG_RST });
    }

    pub fn set_psh(&mut self, value: bool) {
        let raw = self.raw_flags();
        self.set_raw_flags(if value { raw | field::FLG_PSH } else { raw & !field::FLG_PSH });
    }

    pub fn set_ack(&mut self, value: bool) {
        let raw = self.raw_flags();
        self.set_raw_flags(if value { raw | field::FLG_ACK } else { raw & !field::FLG_ACK });
    }

    pub fn set_urg(&mut self, value: bool) {
        let raw = self.raw_flags();
        self.set_raw_flags(if value { raw | field::FLG_URG } else { raw & !field::FLG_URG });
    }

    pub fn set_control(&mut self, control: Control) {
        self.set_syn(control == Control::Syn);
        self.set_fin(control == Control::Fin);
        self.set_rst(control == Control::Rst);
    }

    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::WINDOW], value);
    }

    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CHECKSUM], value);
    }

    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::URGENT], value);
    }

    pub fn options_mut(&mut self) -> &mut [u8] {
        let range = field::OPTIONS(self.data_offset());
        &mut self.buffer.as_mut()[range]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let offset = self.data_offset() as usize * 4;
        let len = self.buffer.as_mut().len();
        &mut self.buffer.as_mut()[offset..len]
    }

    pub fn fill_checksum(&mut self, src_addr: &IpAddress, dst_addr: &IpAddress) {
        self.set_checksum(0);
        let checksum = {
            let data = self.buffer.as_ref();
            !checksum::combine(&[
                checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Tcp, data.len() as u32),
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

/// Selective Acknowledgement subheader (RFC 2018): up to four non-contiguous
/// left/right edge pairs.
pub type SackRanges = [Option<(u32, u32)>; 3];

/// A TCP option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TcpOption<'a> {
    EndOfList,
    NoOperation,
    MaxSegmentSize(u16),
    WindowScale(u8),
    SackPermitted,
    SackRange(SackRanges),
    Timestamp {
        tsval: u32,
        tsecr: u32,
    },
    Unknown {
        kind: u8,
        data: &'a [u8],
    },
}

impl<'a> TcpOption<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<(&'a [u8], TcpOption<'a>)> {
        let (length, option);
        match *buffer.first().ok_or(Error)? {
            field @ (0 | 1) => {
                length = 1;
                option = if field == 0 {
                    TcpOption::EndOfList
                } else {
                    TcpOption::NoOperation
                };
            }
            kind => {
                length = *buffer.get(1).ok_or(Error)? as usize;
                let contents = buffer.get(2..length).ok_or(Error)?;
                match (kind, length) {
                    (1, _) => unreachable!(),
                    (2, 4) => option = TcpOption::MaxSegmentSize(NetworkEndian::read_u16(contents)),
                    (3, 3) => option = TcpOption::WindowScale(contents[0]),
                    (4, 2) => option = TcpOption::SackPermitted,
                    (5, _) if (10..=42).contains(&length) && (length - 2) % 8 == 0 => {
                        let mut ranges: SackRanges = [None; 3];
                        for (slot, chunk) in ranges.iter_mut().zip(contents.chunks_exact(8)) {
                            *slot = Some((
                                NetworkEndian::read_u32(&chunk[0..4]),
                                NetworkEndian::read_u32(&chunk[4..8]),
                            ));
                        }
                        option = TcpOption::SackRange(ranges);
                    }
                    (8, 10) => {
                        option = TcpOption::Timestamp {
                            tsval: NetworkEndian::read_u32(&contents[0..4]),
                            tsecr: NetworkEndian::read_u32(&contents[4..8]),
                        }
                    }
                    (_, _) => option = TcpOption::Unknown { kind, data: contents },
                }
            }
        }
        Ok((&buffer[length..], option))
    }

    pub fn buffer_len(&self) -> usize {
        match *self {
            TcpOption::EndOfList | TcpOption::NoOperation => 1,
            TcpOption::MaxSegmentSize(_) => 4,
            TcpOption::WindowScale(_) => 3,
            TcpOption::SackPermitted => 2,
            TcpOption::SackRange(ranges) => 2 + ranges.iter().flatten().count() * 8,
            TcpOption::Timestamp { .. } => 10,
            TcpOption::Unknown { data, .. } => 2 + data.len(),
        }
    }

    pub fn emit<'b>(&self, buffer: &'b mut [u8]) -> &'b mut [u8] {
        let length;
        match *self {
            TcpOption::EndOfList => {
                length = 1;
                buffer[0] = 0;
            }
            TcpOption::NoOperation => {
                length = 1;
                buffer[0] = 1;
            }
            _ => {
                length = self.buffer_len();
                buffer[1] = length as u8;
                match *self {
                    TcpOption::EndOfList | TcpOption::NoOperation => unreachable!(),
                    TcpOption::MaxSegmentSize(value) => {
                        buffer[0] = 2;
                        NetworkEndian::write_u16(&mut buffer[2..4], value)
                    }
                    TcpOption::WindowScale(value) => {
                        buffer[0] = 3;
                        buffer[2] = value;
                    }
                    TcpOption::SackPermitted => buffer[0] = 4,
                    TcpOption::SackRange(ranges) => {
                        buffer[0] = 5;
                        let mut offset = 2;
                        for (left, right) in ranges.iter().flatten() {
                            NetworkEndian::write_u32(&mut buffer[offset..offset + 4], *left);
                            NetworkEndian::write_u32(&mut buffer[offset + 4..offset + 8], *right);
                            offset += 8;
                        }
                    }
                    TcpOption::Timestamp { tsval, tsecr } => {
                        buffer[0] = 8;
                        NetworkEndian::write_u32(&mut buffer[2..6], tsval);
                        NetworkEndian::write_u32(&mut buffer[6..10], tsecr);
                    }
                    TcpOption::Unknown { kind, data } => {
                        buffer[0] = kind;
                        buffer[2..2 + data.len()].copy_from_slice(data);
                    }
                }
            }
        }
        &mut buffer[length..]
    }
}

/// A representation of a TCP timestamp option, as carried on every segment
/// once negotiated during the handshake (RFC 7323).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpTimestampRepr {
    pub tsval: u32,
    pub tsecr: u32,
}

impl TcpTimestampRepr {
    pub const fn new(tsval: u32, tsecr: u32) -> Self {
        TcpTimestampRepr { tsval, tsecr }
    }
}

impl From<TcpTimestampRepr> for TcpOption<'_> {
    fn from(repr: TcpTimestampRepr) -> Self {
        TcpOption::Timestamp {
            tsval: repr.tsval,
            tsecr: repr.tsecr,
        }
    }
}

/// Produces the `tsval` to stamp on outgoing segments once timestamps have
/// been negotiated; a monotonic millisecond clock on the embedded target.
pub trait TcpTimestampGenerator {
    fn generate(&mut self) -> u32;
}

impl<F> TcpTimestampGenerator for F
where
    F: FnMut() -> u32,
{
    fn generate(&mut self) -> u32 {
        self()
    }
}

/// A high-level representation of a Transmission Control Protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repr<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub control: Control,
    pub seq_number: SeqNumber,
    pub ack_number: Option<SeqNumber>,
    pub window_len: u16,
    pub window_scale: Option<u8>,
    pub max_seg_size: Option<u16>,
    pub sack_permitted: bool,
    pub sack_ranges: SackRanges,
    pub timestamp: Option<TcpTimestampRepr>,
    pub payload: &'a [u8],
}

impl<'a> Repr<'a> {
    /// Parse a TCP packet and return a high-level representation.
    pub fn parse(
        packet: &Packet<&'a [u8]>,
        src_addr: &IpAddress,
        dst_addr: &IpAddress,
        checksum_caps: &ChecksumCapabilities,
    ) -> Result<Repr<'a>> {
        packet.check_len()?;
        if checksum_caps.tcp.rx() && !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error);
        }

        let mut max_seg_size = None;
        let mut window_scale = None;
        let mut sack_permitted = false;
        let mut sack_ranges = [None, None, None];
        let mut timestamp = None;

        let mut options = packet.options();
        while !options.is_empty() {
            let (next_options, option) = TcpOption::parse(options)?;
            match option {
                TcpOption::EndOfList => break,
                TcpOption::NoOperation => (),
                TcpOption::MaxSegmentSize(value) => max_seg_size = Some(value),
                TcpOption::WindowScale(value) => window_scale = Some(value),
                TcpOption::SackPermitted => sack_permitted = true,
                TcpOption::SackRange(ranges) => sack_ranges = ranges,
                TcpOption::Timestamp { tsval, tsecr } => {
                    timestamp = Some(TcpTimestampRepr::new(tsval, tsecr))
                }
                TcpOption::Unknown { .. } => (),
            }
            options = next_options;
        }

        Ok(Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            control: packet.control(),
            seq_number: packet.seq_number(),
            ack_number: if packet.ack() {
                Some(packet.ack_number())
            } else {
                None
            },
            window_len: packet.window_len(),
            window_scale,
            max_seg_size,
            sack_permitted,
            sack_ranges,
            timestamp,
            payload: packet.payload(),
        })
    }

    /// Return the length of the header, including options, that will be
    /// emitted from this high-level representation.
    pub fn header_len(&self) -> usize {
        let mut length = HEADER_LEN;
        if self.max_seg_size.is_some() {
            length += 4;
        }
        if self.window_scale.is_some() {
            length += 3;
        }
        if self.sack_permitted {
            length += 2;
        }
        let sack_range_len: usize = self.sack_ranges.iter().flatten().count() * 8;
        if sack_range_len > 0 {
            length += sack_range_len + 2;
        }
        if self.timestamp.is_some() {
            length += 10;
        }
        // Pad to a multiple of 4 octets, as data_offset is expressed in words.
        length + ((4 - length % 4) % 4)
    }

    pub fn buffer_len(&self) -> usize {
        self.header_len() + self.payload.len()
    }

    /// Return the length of this packet's segment, in sequence space,
    /// including any SYN/FIN control bit.
    pub fn segment_len(&self) -> usize {
        self.payload.len() + self.control.len()
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]> + ?Sized>(
        &self,
        packet: &mut Packet<&mut T>,
        src_addr: &IpAddress,
        dst_addr: &IpAddress,
        checksum_caps: &ChecksumCapabilities,
    ) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(self.ack_number.unwrap_or(SeqNumber(0)));
        packet.set_control(self.control);
        packet.set_ack(self.ack_number.is_some());
        packet.set_window_len(self.window_len);
        packet.set_data_offset((self.header_len() / 4) as u8);
        packet.set_urgent_at(0);

        {
            let mut options = &mut packet.options_mut()[..];
            if let Some(value) = self.max_seg_size {
                options = TcpOption::MaxSegmentSize(value).emit(options);
            }
            if let Some(value) = self.window_scale {
                options = TcpOption::WindowScale(value).emit(options);
            }
            if self.sack_permitted {
                options = TcpOption::SackPermitted.emit(options);
            } else if self.ack_number.is_some() && self.sack_ranges.iter().any(Option::is_some) {
                options = TcpOption::SackRange(self.sack_ranges).emit(options);
            }
            if let Some(timestamp) = self.timestamp {
                options = TcpOption::from(timestamp).emit(options);
            }
            if !options.is_empty() {
                TcpOption::EndOfList.emit(options);
            }
        }

        packet.payload_mut()[..self.payload.len()].copy_from_slice(self.payload);

        if checksum_caps.tcp.tx() {
            packet.fill_checksum(src_addr, dst_addr);
        } else {
            packet.set_checksum(0);
        }
    }
}

impl<'a> fmt::Display for Repr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "TCP src={} dst={} seq={}",
            self.src_port, self.dst_port, self.seq_number
        )?;
        if let Some(ack) = self.ack_number {
            write!(f, " ack={ack}")?;
        }
        write!(f, " win={}", self.window_len)?;
        match self.control {
            Control::Syn => write!(f, " syn")?,
            Control::Fin => write!(f, " fin")?,
            Control::Rst => write!(f, " rst")?,
            _ => (),
        }
        if !self.payload.is_empty() {
            write!(f, " len={}", self.payload.len())?;
        }
        Ok(())
    }
}

use crate::wire::pretty_print::{PrettyIndent, PrettyPrint};

impl<T: AsRef<[u8]>> PrettyPrint for Packet<T> {
    fn pretty_print(buffer: &dyn AsRef<[u8]>, f: &mut fmt::Formatter, indent: &mut PrettyIndent) -> fmt::Result {
        match Packet::new_checked(buffer.as_ref()) {
            Err(err) => write!(f, "{indent}({err})"),
            Ok(packet) => write!(
                f,
                "{indent}TCP src={} dst={} seq={} ack={} win={}",
                packet.src_port(),
                packet.dst_port(),
                packet.seq_number(),
                packet.ack_number(),
                packet.window_len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repr(payload: &'static [u8]) -> Repr<'static> {
        Repr {
            src_port: 48896,
            dst_port: 80,
            control: Control::None,
            seq_number: SeqNumber(1000),
            ack_number: Some(SeqNumber(2000)),
            window_len: 4096,
            window_scale: None,
            max_seg_size: None,
            sack_permitted: false,
            sack_ranges: [None, None, None],
            timestamp: None,
            payload,
        }
    }

    #[test]
    fn emit_then_parse_roundtrips() {
        let r = repr(b"hello");
        let mut buf = vec![0u8; r.buffer_len()];
        let src = IpAddress::v4(192, 168, 1, 1);
        let dst = IpAddress::v4(192, 168, 1, 2);
        let caps = ChecksumCapabilities::default();
        r.emit(&mut Packet::new_unchecked(&mut buf), &src, &dst, &caps);

        let packet = Packet::new_checked(&buf[..]).unwrap();
        assert!(packet.verify_checksum(&src, &dst));
        let parsed = Repr::parse(&packet, &src, &dst, &caps).unwrap();
        assert_eq!(parsed, r);
    }

    #[test]
    fn syn_with_mss_and_window_scale() {
        let mut r = repr(b"");
        r.control = Control::Syn;
        r.ack_number = None;
        r.max_seg_size = Some(1460);
        r.window_scale = Some(7);
        r.sack_permitted = true;

        let mut buf = vec![0u8; r.buffer_len()];
        let src = IpAddress::v4(10, 0, 0, 1);
        let dst = IpAddress::v4(10, 0, 0, 2);
        let caps = ChecksumCapabilities::default();
        r.emit(&mut Packet::new_unchecked(&mut buf), &src, &dst, &caps);

        let packet = Packet::new_checked(&buf[..]).unwrap();
        let parsed = Repr::parse(&packet, &src, &dst, &caps).unwrap();
        assert_eq!(parsed.max_seg_size, Some(1460));
        assert_eq!(parsed.window_scale, Some(7));
        assert!(parsed.sack_permitted);
        assert!(parsed.ack_number.is_none());
    }

    #[test]
    fn seq_number_wraparound_ordering() {
        let a = SeqNumber(i32::MAX);
        let b = a + 10;
        assert!(a < b);
        assert_eq!(b - a, 10);
    }
}
