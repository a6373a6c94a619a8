use core::cmp;
use core::fmt;
use core::mem;

use crate::iface::InterfaceInner;
use crate::phy::ChecksumCapabilities;
use crate::storage::{Assembler, RingBuffer};
use crate::time::{Duration, Instant};
use crate::wire::{
    IpAddress, IpEndpoint, IpListenEndpoint, IpProtocol, IpRepr, TcpControl, TcpRepr, TcpSeqNumber,
};

use super::PollAt;

mod congestion;

const RTTE_INITIAL_RTO: u32 = 1000;
const DEFAULT_MSS: usize = 536;
const ACK_DELAY_DEFAULT: Duration = crate::config::TCP_DELAYED_ACK_TIMEOUT;

/// Error returned by [`Socket::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenError {
    Unaddressable,
    InvalidState,
}

impl fmt::Display for ListenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ListenError::Unaddressable => write!(f, "unaddressable"),
            ListenError::InvalidState => write!(f, "invalid state"),
        }
    }
}

/// Error returned by [`Socket::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    Unaddressable,
    InvalidState,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectError::Unaddressable => write!(f, "unaddressable"),
            ConnectError::InvalidState => write!(f, "invalid state"),
        }
    }
}

/// Error returned by [`Socket::send`] and [`Socket::send_slice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    InvalidState,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid state")
    }
}

/// Error returned by [`Socket::recv`] and [`Socket::recv_slice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    InvalidState,
    Finished,
}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecvError::InvalidState => write!(f, "invalid state"),
            RecvError::Finished => write!(f, "stream has been finished"),
        }
    }
}

/// The state of a TCP socket, according to [RFC 793].
///
/// [RFC 793]: https://tools.ietf.org/html/rfc793
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Timer {
    Idle { keep_alive_at: Option<Instant> },
    Retransmit { expires_at: Instant },
    FastRetransmit,
    Close { expires_at: Instant },
}

impl Timer {
    fn new() -> Timer {
        Timer::Idle {
            keep_alive_at: None,
        }
    }

    fn should_retransmit(&self, timestamp: Instant) -> Option<Duration> {
        match *self {
            Timer::Retransmit { expires_at } if timestamp >= expires_at => {
                Some(timestamp - expires_at)
            }
            _ => None,
        }
    }

    fn should_keep_alive(&self, timestamp: Instant) -> bool {
        matches!(*self, Timer::Idle { keep_alive_at: Some(at) } if timestamp >= at)
    }

    fn should_close(&self, timestamp: Instant) -> bool {
        matches!(*self, Timer::Close { expires_at } if timestamp >= expires_at)
    }

    fn poll_at(&self) -> PollAt {
        match *self {
            Timer::Idle {
                keep_alive_at: Some(at),
            } => PollAt::Time(at),
            Timer::Idle {
                keep_alive_at: None,
            } => PollAt::Ingress,
            Timer::Retransmit { expires_at, .. } => PollAt::Time(expires_at),
            Timer::FastRetransmit => PollAt::Now,
            Timer::Close { expires_at } => PollAt::Time(expires_at),
        }
    }

    fn set_for_idle(&mut self, timestamp: Instant, keep_alive: Option<Duration>) {
        *self = Timer::Idle {
            keep_alive_at: keep_alive.map(|interval| timestamp + interval),
        }
    }

    fn set_keep_alive(&mut self) {
        if let Timer::Idle { keep_alive_at } = self {
            if keep_alive_at.is_none() {
                *keep_alive_at = Some(Instant::from_millis(0));
            }
        }
    }

    fn rewind_keep_alive(&mut self, timestamp: Instant, interval: Option<Duration>) {
        if let Timer::Idle { keep_alive_at } = self {
            *keep_alive_at = interval.map(|interval| timestamp + interval);
        }
    }

    fn set_for_retransmit(&mut self, timestamp: Instant, delay: Duration) {
        match *self {
            Timer::Idle { .. } | Timer::FastRetransmit | Timer::Retransmit { .. } => {
                *self = Timer::Retransmit {
                    expires_at: timestamp + delay,
                };
            }
            Timer::Close { .. } => (),
        }
    }

    fn set_for_fast_retransmit(&mut self) {
        *self = Timer::FastRetransmit
    }

    fn set_for_close(&mut self, timestamp: Instant) {
        *self = Timer::Close {
            expires_at: timestamp + crate::config::MSL * 2,
        }
    }

    fn is_retransmit(&self) -> bool {
        matches!(*self, Timer::Retransmit { .. } | Timer::FastRetransmit)
    }
}

#[derive(Debug, Clone, Copy)]
struct RttEstimator {
    /// true if we have made at least one rtt measurement.
    have_measurement: bool,
    // Using u32 instead of Duration to save space (Duration is i64)
    /// Smoothed RTT
    srtt: u32,
    /// RTT variance.
    rttvar: u32,
    /// Retransmission Time-Out
    rto: u32,
    timestamp: Option<(Instant, TcpSeqNumber)>,
    max_seq_sent: Option<TcpSeqNumber>,
    rto_count: u8,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self {
            have_measurement: false,
            srtt: 0,   // ignored, will be overwritten on first measurement.
            rttvar: 0, // ignored, will be overwritten on first measurement.
            rto: RTTE_INITIAL_RTO,
            timestamp: None,
            max_seq_sent: None,
            rto_count: 0,
        }
    }
}

impl RttEstimator {
    fn retransmission_timeout(&self) -> Duration {
        let rto = self.rto.clamp(
            crate::config::RTO_MIN.total_millis() as u32,
            crate::config::RTO_MAX.total_millis() as u32,
        );
        Duration::from_millis(rto as u64)
    }

    fn sample(&mut self, new_rtt: u32) {
        if self.have_measurement {
            let diff = (self.srtt as i32 - new_rtt as i32).unsigned_abs();
            self.rttvar = (self.rttvar * 3 + diff) / 4;
            self.srtt = (self.srtt * 7 + new_rtt) / 8;
        } else {
            self.have_measurement = true;
            self.srtt = new_rtt;
            self.rttvar = new_rtt / 2;
        }
        self.rto = self.srtt + cmp::max(1, 4 * self.rttvar);
        self.rto_count = 0;
    }

    fn on_send(&mut self, timestamp: Instant, seq: TcpSeqNumber) {
        if self
            .max_seq_sent
            .map(|max_seq_sent| seq > max_seq_sent)
            .unwrap_or(true)
        {
            self.max_seq_sent = Some(seq);
            if self.timestamp.is_none() {
                self.timestamp = Some((timestamp, seq));
            }
        }
    }

    fn on_ack(&mut self, timestamp: Instant, seq: TcpSeqNumber) {
        if let Some((sent_timestamp, sent_seq)) = self.timestamp {
            if seq >= sent_seq {
                self.sample((timestamp - sent_timestamp).total_millis() as u32);
                self.timestamp = None;
            }
        }
    }

    fn on_retransmit(&mut self) {
        if self.timestamp.is_some() {
            self.timestamp = None;
        }
        self.rto_count = self.rto_count.saturating_add(1);
        if self.rto_count >= 3 {
            self.rto = cmp::min(self.rto * 2, crate::config::RTO_MAX.total_millis() as u32);
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Tuple {
    local: IpEndpoint,
    remote: IpEndpoint,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum AckDelayTimer {
    Idle,
    Waiting(Instant),
    Immediate,
}

/// A TCP socket ring buffer.
pub type SocketBuffer<'a> = RingBuffer<'a, u8>;

pub type TcpTimestampGenerator = fn() -> u32;

/// A Transmission Control Protocol socket.
///
/// A TCP socket may passively listen for connections or actively connect to another endpoint.
/// Note that, for listening sockets, there is no "backlog"; to be able to simultaneously
/// accept several connections, as many sockets must be allocated, or any new connection
/// attempts will be reset.
#[derive(Debug)]
pub struct Socket<'a> {
    state: State,
    timer: Timer,
    rtte: RttEstimator,
    assembler: Assembler,
    rx_buffer: SocketBuffer<'a>,
    rx_fin_received: bool,
    tx_buffer: SocketBuffer<'a>,
    /// Interval after which, if no inbound packets are received, the connection is aborted.
    timeout: Option<Duration>,
    /// Interval at which keep-alive packets will be sent.
    keep_alive: Option<Duration>,
    /// The time-to-live (IPv4) or hop limit (IPv6) value used in outgoing packets.
    hop_limit: Option<u8>,
    /// Address passed to listen(). Listen address is set when listen() is called and
    /// used every time the socket is reset back to the LISTEN state.
    listen_endpoint: IpListenEndpoint,
    /// Current 4-tuple (local and remote endpoints).
    tuple: Option<Tuple>,
    /// The sequence number corresponding to the beginning of the transmit buffer.
    /// I.e. an ACK(local_seq_no+n) packet removes n bytes from the transmit buffer.
    local_seq_no: TcpSeqNumber,
    /// The sequence number corresponding to the beginning of the receive buffer.
    /// I.e. userspace reading n bytes adds n to remote_seq_no.
    remote_seq_no: TcpSeqNumber,
    /// The last sequence number sent.
    /// I.e. in an idle socket, local_seq_no+tx_buffer.len().
    remote_last_seq: TcpSeqNumber,
    /// The last acknowledgement number sent.
    /// I.e. in an idle socket, remote_seq_no+rx_buffer.len().
    remote_last_ack: Option<TcpSeqNumber>,
    /// The last window length sent.
    remote_last_win: u16,
    /// The sending window scaling factor advertised to remotes which support RFC 1323.
    /// It is zero if the window <= 64KiB and/or the remote does not support it.
    remote_win_shift: u8,
    /// The remote window size, relative to local_seq_no
    /// I.e. we're allowed to send octets until local_seq_no+remote_win_len
    remote_win_len: usize,
    /// The receive window scaling factor for remotes which support RFC 1323, None if unsupported.
    remote_win_scale: Option<u8>,
    /// Whether or not the remote supports selective ACK as described in RFC 2018.
    remote_has_sack: bool,
    /// The maximum number of data octets that the remote side may receive.
    remote_mss: usize,
    /// The timestamp of the last packet received.
    remote_last_ts: Option<Instant>,
    /// The sequence number of the last packet received, used for sACK
    local_rx_last_seq: Option<TcpSeqNumber>,
    /// The ACK number of the last packet received.
    local_rx_last_ack: Option<TcpSeqNumber>,
    /// The number of packets received directly after
    /// each other which have the same ACK number.
    local_rx_dup_acks: u8,

    /// Duration for Delayed ACK. If None no ACKs will be delayed.
    ack_delay: Option<Duration>,
    /// Delayed ack timer. If set, packets containing exclusively
    /// ACK or window updates (ie, no data) won't be sent until expiry.
    ack_delay_timer: AckDelayTimer,

    /// Used for rate-limiting: No more challenge ACKs will be sent until this instant.
    challenge_ack_timer: Instant,

    /// Nagle's Algorithm enabled.
    nagle: bool,

    /// The congestion control algorithm.
    congestion_controller: congestion::AnyController,

    /// tsval generator - if some, tcp timestamp is enabled
    tsval_generator: Option<TcpTimestampGenerator>,

    /// 0 if not seen or timestamp not enabled
    last_remote_tsval: u32,
}

const DEFAULT_MSS_USIZE: usize = DEFAULT_MSS;

impl<'a> Socket<'a> {
    #[allow(unused_comparisons)] // small usize platforms always pass rx_capacity check
    /// Create a socket using the given buffers.
    pub fn new<T>(rx_buffer: T, tx_buffer: T) -> Socket<'a>
    where
        T: Into<SocketBuffer<'a>>,
    {
        let (rx_buffer, tx_buffer) = (rx_buffer.into(), tx_buffer.into());
        let rx_capacity = rx_buffer.capacity();

        // From RFC 1323:
        // [...] the above constraints imply that 2 * the max window size must be less
        // than 2**31 [...] Thus, the shift count must be limited to 14 (which allows
        // windows of 2**30 = 1 Gbyte).
        if rx_capacity > (1 << 30) {
            panic!("receiving buffer too large, cannot exceed 1 GiB")
        }
        let rx_cap_log2 = mem::size_of::<usize>() * 8 - rx_capacity.leading_zeros() as usize;

        Socket {
            state: State::Closed,
            timer: Timer::new(),
            rtte: RttEstimator::default(),
            assembler: Assembler::new(),
            tx_buffer,
            rx_buffer,
            rx_fin_received: false,
            timeout: None,
            keep_alive: None,
            hop_limit: None,
            listen_endpoint: IpListenEndpoint::default(),
            tuple: None,
            local_seq_no: TcpSeqNumber::default(),
            remote_seq_no: TcpSeqNumber::default(),
            remote_last_seq: TcpSeqNumber::default(),
            remote_last_ack: None,
            remote_last_win: 0,
            remote_win_len: 0,
            remote_win_shift: rx_cap_log2.saturating_sub(16) as u8,
            remote_win_scale: None,
            remote_has_sack: false,
            remote_mss: DEFAULT_MSS_USIZE,
            remote_last_ts: None,
            local_rx_last_ack: None,
            local_rx_last_seq: None,
            local_rx_dup_acks: 0,
            ack_delay: Some(ACK_DELAY_DEFAULT),
            ack_delay_timer: AckDelayTimer::Idle,
            challenge_ack_timer: Instant::from_secs(0),
            nagle: true,
            tsval_generator: None,
            last_remote_tsval: 0,
            congestion_controller: congestion::AnyController::new(),
        }
    }

    /// Return the socket's current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Set the timeout for the socket.
    pub fn set_timeout(&mut self, duration: Option<Duration>) {
        self.timeout = duration
    }

    /// Return the timeout for the socket.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Set the keep-alive interval for the socket.
    pub fn set_keep_alive(&mut self, interval: Option<Duration>) {
        self.keep_alive = interval;
        if self.keep_alive.is_some() {
            self.timer.set_keep_alive();
        }
    }

    /// Return the keep-alive interval for the socket.
    pub fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive
    }

    /// Set the hop limit field in the IP header of outgoing packets.
    pub fn set_hop_limit(&mut self, hop_limit: Option<u8>) {
        if let Some(hop_limit) = hop_limit {
            assert!(hop_limit != 0, "the time-to-live value must not be 0");
        }
        self.hop_limit = hop_limit;
    }

    /// Return the hop limit field set for outgoing packets.
    pub fn hop_limit(&self) -> Option<u8> {
        self.hop_limit
    }

    /// Set the delayed ACK timeout. `None` disables delaying ACKs.
    pub fn set_ack_delay(&mut self, duration: Option<Duration>) {
        self.ack_delay = duration;
    }

    /// The current delayed ACK timeout, or `None` if delaying is disabled.
    pub fn ack_delay(&self) -> Option<Duration> {
        self.ack_delay
    }

    /// Whether Nagle's Algorithm is enabled.
    pub fn nagle_enabled(&self) -> bool {
        self.nagle
    }

    /// Enable or disable Nagle's Algorithm.
    pub fn set_nagle_enabled(&mut self, enabled: bool) {
        self.nagle = enabled
    }

    /// Return the local endpoint, if connected.
    pub fn local_endpoint(&self) -> Option<IpEndpoint> {
        self.tuple.map(|t| t.local)
    }

    /// Return the remote endpoint, if connected.
    pub fn remote_endpoint(&self) -> Option<IpEndpoint> {
        self.tuple.map(|t| t.remote)
    }

    /// Return whether the receive half of the full-duplex connection is open.
    pub fn may_recv(&self) -> bool {
        match self.state {
            State::Established => true,
            // In CLOSE-WAIT, the remote endpoint has closed our receive half of the connection.
            State::CloseWait => true,
            _ => false,
        }
    }

    /// Return whether the transmit half of the full-duplex connection is open.
    pub fn may_send(&self) -> bool {
        match self.state {
            State::Established => true,
            // In CLOSE-WAIT, the remote endpoint has closed its transmit half of the connection
            // but we still have to send all and any remaining data.
            State::CloseWait => true,
            // In FIN-WAIT-1/2, we have closed our transmit half of the connection but
            // we still can receive indefinitely.
            State::FinWait1 | State::FinWait2 => false,
            _ => false,
        }
    }

    /// Check whether the transmit half of the full-duplex connection is open
    /// (data can still be enqueued to send).
    pub fn can_send(&self) -> bool {
        if self.send_queue() < self.send_capacity() {
            matches!(self.state, State::Established | State::CloseWait)
        } else {
            false
        }
    }

    /// Check whether the receive half of the full-duplex connection buffer has data queued.
    pub fn can_recv(&self) -> bool {
        !self.rx_buffer.is_empty()
    }

    /// Return the maximum number of bytes inside the recv buffer.
    pub fn recv_capacity(&self) -> usize {
        self.rx_buffer.capacity()
    }

    /// Return the maximum number of bytes inside the transmit buffer.
    pub fn send_capacity(&self) -> usize {
        self.tx_buffer.capacity()
    }

    /// Return the number of bytes queued in the transmit buffer.
    pub fn send_queue(&self) -> usize {
        self.tx_buffer.len()
    }

    /// Return the number of bytes queued in the receive buffer.
    pub fn recv_queue(&self) -> usize {
        self.rx_buffer.len()
    }

    /// Return whether the socket is passively listening for incoming connections.
    pub fn is_listening(&self) -> bool {
        self.state == State::Listen
    }

    /// Return whether the socket is open, i.e. either actively connecting, passively
    /// listening, or established.
    pub fn is_open(&self) -> bool {
        self.state != State::Closed
    }

    /// Return whether the socket has an established connection.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, State::Closed | State::Listen | State::TimeWait)
    }

    fn reset(&mut self) {
        self.state = State::Closed;
        self.timer = Timer::new();
        self.rtte = RttEstimator::default();
        self.assembler = Assembler::new();
        self.tx_buffer.clear();
        self.rx_buffer.clear();
        self.rx_fin_received = false;
        self.listen_endpoint = IpListenEndpoint::default();
        self.tuple = None;
        self.local_seq_no = TcpSeqNumber::default();
        self.remote_seq_no = TcpSeqNumber::default();
        self.remote_last_seq = TcpSeqNumber::default();
        self.remote_last_ack = None;
        self.remote_last_win = 0;
        self.remote_win_len = 0;
        self.remote_win_scale = None;
        self.remote_has_sack = false;
        self.remote_mss = DEFAULT_MSS_USIZE;
        self.remote_last_ts = None;
        self.ack_delay_timer = AckDelayTimer::Idle;
        self.challenge_ack_timer = Instant::from_secs(0);
        self.congestion_controller = congestion::AnyController::new();
        self.tsval_generator = None;
        self.last_remote_tsval = 0;
    }

    /// Start listening for an incoming connection on `local_endpoint`.
    pub fn listen<T>(&mut self, local_endpoint: T) -> Result<(), ListenError>
    where
        T: Into<IpListenEndpoint>,
    {
        let local_endpoint = local_endpoint.into();
        if local_endpoint.port == 0 {
            return Err(ListenError::Unaddressable);
        }

        if self.is_open() {
            return Err(ListenError::InvalidState);
        }

        self.reset();
        self.listen_endpoint = local_endpoint;
        self.state = State::Listen;
        Ok(())
    }

    /// Connect to a remote endpoint.
    pub fn connect<T, U>(
        &mut self,
        cx: &mut InterfaceInner,
        remote_endpoint: T,
        local_endpoint: U,
    ) -> Result<(), ConnectError>
    where
        T: Into<IpEndpoint>,
        U: Into<IpListenEndpoint>,
    {
        let remote_endpoint = remote_endpoint.into();
        let local_endpoint = local_endpoint.into();

        if remote_endpoint.port == 0 || remote_endpoint.addr.is_unspecified() {
            return Err(ConnectError::Unaddressable);
        }
        if self.is_open() {
            return Err(ConnectError::InvalidState);
        }

        let local_addr = match local_endpoint.addr {
            Some(addr) => addr,
            None => cx
                .get_source_address(&remote_endpoint.addr)
                .ok_or(ConnectError::Unaddressable)?,
        };
        let local_port = if local_endpoint.port != 0 {
            local_endpoint.port
        } else {
            cx.rand().rand_source_port()
        };

        self.reset();
        self.tuple = Some(Tuple {
            local: IpEndpoint::new(local_addr, local_port),
            remote: remote_endpoint,
        });

        let local_seq_no = TcpSeqNumber(cx.rand().rand_u32() as i32);
        self.local_seq_no = local_seq_no;
        self.remote_last_seq = local_seq_no;
        self.state = State::SynSent;
        Ok(())
    }

    /// Close the transmit half of the connection.
    ///
    /// Note that there is no corresponding function for the receive half of the connection;
    /// only the remote end can close it. If you no longer wish to receive any data and would
    /// like to reuse the socket right away, use [abort](#method.abort).
    pub fn close(&mut self) {
        match self.state {
            State::Listen => self.state = State::Closed,
            State::SynSent | State::SynReceived | State::Established => {
                self.state = State::FinWait1
            }
            State::CloseWait => self.state = State::LastAck,
            State::FinWait1
            | State::FinWait2
            | State::Closing
            | State::LastAck
            | State::TimeWait
            | State::Closed => {}
        }
    }

    /// Aborts the connection, if any, resetting the socket to the CLOSED state,
    /// and places the socket into TIME-WAIT state only when a final RST would
    /// need to be acknowledged; in practice callers simply reset state.
    pub fn abort(&mut self) {
        self.state = State::Closed;
    }

    /// Enqueue a sequence of octets to be sent, and return the number of octets queued.
    pub fn send_slice(&mut self, data: &[u8]) -> Result<usize, SendError> {
        if !self.may_send() && !matches!(self.state, State::SynSent | State::SynReceived) {
            return Err(SendError::InvalidState);
        }
        let (size, _) = self.tx_buffer.enqueue_many_with(|buf| {
            let size = cmp::min(data.len(), buf.len());
            buf[..size].copy_from_slice(&data[..size]);
            (size, ())
        });
        Ok(size)
    }

    /// Dequeue a sequence of received octets, and return the number of octets dequeued.
    pub fn recv_slice(&mut self, data: &mut [u8]) -> Result<usize, RecvError> {
        if self.rx_buffer.is_empty() {
            if !self.may_recv() {
                return if self.rx_fin_received {
                    Err(RecvError::Finished)
                } else {
                    Err(RecvError::InvalidState)
                };
            }
            return Ok(0);
        }
        let (size, _) = self.rx_buffer.dequeue_many_with(|buf| {
            let size = cmp::min(data.len(), buf.len());
            data[..size].copy_from_slice(&buf[..size]);
            (size, ())
        });
        Ok(size)
    }

    /// Peek at received octets without removing them from the receive buffer.
    pub fn peek_slice(&mut self, data: &mut [u8]) -> Result<usize, RecvError> {
        if self.rx_buffer.is_empty() && !self.may_recv() {
            return if self.rx_fin_received {
                Err(RecvError::Finished)
            } else {
                Err(RecvError::InvalidState)
            };
        }
        let buf = self.rx_buffer.get_allocated(0, data.len());
        data[..buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn remote_win_scale_or_zero(&self) -> u8 {
        self.remote_win_scale.unwrap_or(0)
    }

    /// The effective maximum segment size we will use toward the remote,
    /// accounting for their advertised MSS and our own receive buffer size.
    fn effective_mss(&self) -> usize {
        cmp::min(self.remote_mss, DEFAULT_MSS_USIZE.max(self.remote_mss))
    }

    /// Check whether a segment is addressed to this socket.
    pub(crate) fn accepts(&self, _cx: &mut InterfaceInner, ip_repr: &IpRepr, repr: &TcpRepr) -> bool {
        if self.state == State::Closed {
            return false;
        }

        if let Some(tuple) = self.tuple {
            return tuple.local.addr == ip_repr.dst_addr()
                && tuple.local.port == repr.dst_port
                && tuple.remote.addr == ip_repr.src_addr()
                && tuple.remote.port == repr.src_port;
        }

        // Listening socket: not yet bound to a specific remote.
        if self.listen_endpoint.port != repr.dst_port {
            return false;
        }
        match self.listen_endpoint.addr {
            Some(addr) => addr == ip_repr.dst_addr(),
            None => true,
        }
    }

    pub(crate) fn rst_reply(ip_repr: &IpRepr, repr: &TcpRepr) -> (IpRepr, TcpRepr<'static>) {
        debug_assert!(repr.control != TcpControl::Rst);

        let (seq_number, ack_number) = match repr.ack_number {
            Some(ack_number) if repr.control != TcpControl::Syn => (ack_number, None),
            _ => (
                TcpSeqNumber::default(),
                Some(repr.seq_number + repr.segment_len()),
            ),
        };

        let tcp_reply_repr = TcpRepr {
            src_port: repr.dst_port,
            dst_port: repr.src_port,
            control: TcpControl::Rst,
            seq_number,
            ack_number,
            window_len: 0,
            window_scale: None,
            max_seg_size: None,
            sack_permitted: false,
            sack_ranges: [None, None, None],
            timestamp: None,
            payload: &[],
        };

        let ip_reply_repr = IpRepr::new(
            ip_repr.dst_addr(),
            ip_repr.src_addr(),
            IpProtocol::Tcp,
            tcp_reply_repr.buffer_len(),
            64,
        );

        (ip_reply_repr, tcp_reply_repr)
    }

    /// Build a re-synchronising ACK for a segment that fell outside our
    /// receive window: carries no data, just our current sequence/ack state,
    /// so a peer that lost track of the connection can recover instead of
    /// being met with silence.
    fn ack_reply(&self, tuple: Tuple) -> (IpRepr, TcpRepr<'static>) {
        let window_len = cmp::min(self.rx_buffer.window(), (u16::MAX as usize) << self.remote_win_scale_or_zero());
        let window_len_scaled = (window_len >> self.remote_win_scale_or_zero()) as u16;

        let tcp_repr = TcpRepr {
            src_port: tuple.local.port,
            dst_port: tuple.remote.port,
            control: TcpControl::None,
            seq_number: self.remote_last_seq,
            ack_number: Some(self.remote_seq_no),
            window_len: window_len_scaled,
            window_scale: None,
            max_seg_size: None,
            sack_permitted: false,
            sack_ranges: [None, None, None],
            timestamp: None,
            payload: &[],
        };

        let ip_repr = IpRepr::new(
            tuple.local.addr,
            tuple.remote.addr,
            IpProtocol::Tcp,
            tcp_repr.buffer_len(),
            self.hop_limit.unwrap_or(64),
        );

        (ip_repr, tcp_repr)
    }

    /// Arm the delayed-ACK timer for a freshly-received in-order segment.
    /// With `ack_delay` disabled, or once a delay is already pending, this
    /// acks immediately or leaves the pending deadline alone — the 200ms
    /// budget is measured from the *first* unacked segment, not reset by
    /// every later one.
    fn schedule_ack(&mut self, now: Instant) {
        match self.ack_delay {
            None => self.ack_delay_timer = AckDelayTimer::Immediate,
            Some(delay) => {
                if self.ack_delay_timer == AckDelayTimer::Idle {
                    self.ack_delay_timer = AckDelayTimer::Waiting(now + delay);
                }
            }
        }
    }

    /// Process an incoming segment, updating internal state. Returns an
    /// immediate reply when one must be sent outside of the normal dispatch
    /// cadence (e.g. a RST for an unacceptable segment).
    pub(crate) fn process(
        &mut self,
        cx: &mut InterfaceInner,
        ip_repr: &IpRepr,
        repr: &TcpRepr,
    ) -> Option<(IpRepr, TcpRepr<'static>)> {
        debug_assert!(self.accepts(cx, ip_repr, repr));

        let now = cx.now();
        self.remote_last_ts = Some(now);

        match self.state {
            State::Closed => {
                return Some(Self::rst_reply(ip_repr, repr));
            }
            State::Listen => {
                if repr.control != TcpControl::Syn || repr.ack_number.is_some() {
                    return None;
                }

                self.tuple = Some(Tuple {
                    local: IpEndpoint::new(ip_repr.dst_addr(), repr.dst_port),
                    remote: IpEndpoint::new(ip_repr.src_addr(), repr.src_port),
                });

                let local_seq_no = TcpSeqNumber(cx.rand().rand_u32() as i32);
                self.local_seq_no = local_seq_no;
                self.remote_seq_no = repr.seq_number + 1;
                self.remote_last_seq = local_seq_no;
                self.remote_last_ack = Some(self.remote_seq_no);
                self.remote_mss = repr.max_seg_size.map(|mss| mss as usize).unwrap_or(DEFAULT_MSS_USIZE);
                self.remote_win_scale = repr.window_scale;
                self.remote_has_sack = repr.sack_permitted;
                if self.remote_win_scale.is_none() {
                    self.remote_win_shift = 0;
                }
                self.state = State::SynReceived;
                self.ack_delay_timer = AckDelayTimer::Immediate;
                return None;
            }
            State::SynSent => {
                // RFC 793: in SYN-SENT, a RST is only honoured if it exactly
                // acknowledges our SYN; anything else is an off-path guess.
                if repr.control == TcpControl::Rst {
                    let ack_matches_syn = match repr.ack_number {
                        Some(ack) => ack == self.local_seq_no + 1,
                        None => false,
                    };
                    if ack_matches_syn {
                        self.state = State::Closed;
                        self.tuple = None;
                    }
                    return None;
                }
                if repr.control == TcpControl::Syn {
                    let ack_ok = match repr.ack_number {
                        Some(ack) => ack == self.local_seq_no + 1,
                        None => false,
                    };
                    if !ack_ok {
                        return None;
                    }
                    self.remote_seq_no = repr.seq_number + 1;
                    self.remote_last_ack = Some(self.remote_seq_no);
                    self.local_seq_no = self.local_seq_no + 1;
                    self.remote_mss = repr.max_seg_size.map(|mss| mss as usize).unwrap_or(DEFAULT_MSS_USIZE);
                    self.remote_win_scale = repr.window_scale;
                    self.remote_win_len = (repr.window_len as usize) << self.remote_win_scale_or_zero();
                    self.congestion_controller.set_mss(self.effective_mss());
                    self.state = State::Established;
                }
                return None;
            }
            _ => {}
        }

        // Sequence-number acceptance check for established-ish states: a
        // segment outside the advertised receive window is either a stale
        // retransmission or an attacker's guess. RFC 793 has us challenge it
        // with an ACK carrying our current state rather than staying silent,
        // so the peer can re-synchronise if it really lost track of us.
        if repr.seq_number != self.remote_seq_no
            && !repr.seq_number.in_range(
                self.remote_seq_no - 1,
                self.remote_seq_no + self.rx_buffer.window() + 1,
            )
        {
            if repr.control == TcpControl::Rst {
                return None;
            }
            let Some(tuple) = self.tuple else { return None };
            return Some(self.ack_reply(tuple));
        }

        // The segment is within our window, so a RST now genuinely comes
        // from (or on behalf of) our peer; honour it here rather than
        // before the window check, which would let a blind off-path RST
        // with a guessed sequence number tear down the connection.
        if repr.control == TcpControl::Rst {
            self.state = State::Closed;
            self.tuple = None;
            return None;
        }

        if let Some(ack_number) = repr.ack_number {
            match self.state {
                State::SynReceived => {
                    if ack_number == self.local_seq_no + 1 {
                        self.local_seq_no = ack_number;
                        self.state = State::Established;
                        self.congestion_controller.set_mss(self.effective_mss());
                    }
                }
                State::Established
                | State::FinWait1
                | State::FinWait2
                | State::CloseWait
                | State::Closing
                | State::LastAck => {
                    let acked = if ack_number >= self.local_seq_no {
                        ack_number - self.local_seq_no
                    } else {
                        0
                    };
                    if acked > 0 && acked <= self.tx_buffer.len() {
                        self.tx_buffer.dequeue_many(acked);
                        self.local_seq_no = ack_number;
                        self.rtte.on_ack(now, ack_number);
                        self.congestion_controller.on_ack(now, acked, &self.rtte);
                        self.timer.set_for_idle(now, self.keep_alive);
                    }

                    match self.state {
                        State::FinWait1 if ack_number == self.local_seq_no + 1 => {
                            self.state = State::FinWait2;
                        }
                        State::Closing if ack_number == self.local_seq_no + 1 => {
                            self.state = State::TimeWait;
                            self.timer.set_for_close(now);
                        }
                        State::LastAck if ack_number == self.local_seq_no + 1 => {
                            self.state = State::Closed;
                            self.tuple = None;
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if !repr.payload.is_empty() {
            let offset = repr.seq_number - self.remote_seq_no;
            if self.assembler.add(offset, repr.payload.len()).is_ok() {
                self.rx_buffer.write_unallocated(offset, repr.payload);
            }
            let contig = self.assembler.peek_front();
            if contig > 0 {
                self.rx_buffer.enqueue_unallocated(contig);
                self.assembler.remove_front(contig);
                self.remote_seq_no = self.remote_seq_no + contig;
            }
            self.schedule_ack(now);
        }

        if repr.control == TcpControl::Fin {
            self.remote_seq_no = self.remote_seq_no + 1;
            self.rx_fin_received = true;
            self.ack_delay_timer = AckDelayTimer::Immediate;
            match self.state {
                State::Established => self.state = State::CloseWait,
                State::FinWait1 => {
                    self.state = State::Closing;
                }
                State::FinWait2 => {
                    self.state = State::TimeWait;
                    self.timer.set_for_close(now);
                }
                _ => {}
            }
        }

        None
    }

    /// Emit an outgoing packet, if one is due, and hand it to `emit`.
    pub(crate) fn dispatch<F, E>(&mut self, cx: &mut InterfaceInner, emit: F) -> Result<(), E>
    where
        F: FnOnce(&mut InterfaceInner, (IpRepr, TcpRepr)) -> Result<(), E>,
    {
        let Some(tuple) = self.tuple else {
            return Ok(());
        };
        let now = cx.now();

        if let Some(expires_at) = self.timer.should_retransmit(now) {
            let _ = expires_at;
            self.congestion_controller.on_retransmit(now);
            self.rtte.on_retransmit();
            self.remote_last_seq = self.local_seq_no;
        }

        if self.timer.should_close(now) {
            self.state = State::Closed;
            self.tuple = None;
            return Ok(());
        }

        let want_ack = match self.ack_delay_timer {
            AckDelayTimer::Immediate => true,
            AckDelayTimer::Waiting(at) => now >= at,
            AckDelayTimer::Idle => false,
        };
        let unsent = (self.local_seq_no + self.tx_buffer.len()) - self.remote_last_seq;
        let want_syn = matches!(self.state, State::SynSent | State::SynReceived)
            && self.remote_last_seq == self.local_seq_no;
        let want_fin = matches!(
            self.state,
            State::FinWait1 | State::LastAck | State::Closing
        ) && self.remote_last_seq == self.local_seq_no + self.tx_buffer.len();

        if !want_ack && unsent == 0 && !want_syn && !want_fin {
            return Ok(());
        }

        let mut control = TcpControl::None;
        if want_syn {
            control = TcpControl::Syn;
        } else if want_fin {
            control = TcpControl::Fin;
        }

        let max_send = cmp::min(self.effective_mss(), self.congestion_controller.window());
        let offset = self.remote_last_seq - self.local_seq_no;
        let payload = if control == TcpControl::None {
            let avail = self.tx_buffer.len().saturating_sub(offset);
            let size = cmp::min(avail, max_send);
            self.tx_buffer.get_allocated(offset, size)
        } else {
            &[]
        };

        let ack_number = if self.state == State::SynSent {
            None
        } else {
            Some(self.remote_seq_no)
        };

        let window_len = cmp::min(self.rx_buffer.window(), (u16::MAX as usize) << self.remote_win_scale_or_zero());
        let window_len_scaled = (window_len >> self.remote_win_scale_or_zero()) as u16;

        let repr = TcpRepr {
            src_port: tuple.local.port,
            dst_port: tuple.remote.port,
            control,
            seq_number: self.remote_last_seq,
            ack_number,
            window_len: window_len_scaled,
            window_scale: if want_syn {
                Some(self.remote_win_shift)
            } else {
                None
            },
            max_seg_size: if want_syn {
                Some(self.rx_buffer.capacity().min(u16::MAX as usize) as u16)
            } else {
                None
            },
            sack_permitted: want_syn,
            sack_ranges: [None, None, None],
            timestamp: None,
            payload,
        };

        let sent = payload.len() + control.len();
        self.remote_last_seq = self.remote_last_seq + sent;
        self.remote_last_ack = ack_number;
        self.remote_last_win = window_len_scaled;
        self.rtte.on_send(now, self.remote_last_seq);
        self.ack_delay_timer = AckDelayTimer::Idle;

        if sent > 0 {
            self.timer
                .set_for_retransmit(now, self.rtte.retransmission_timeout());
        } else {
            self.timer.set_for_idle(now, self.keep_alive);
        }

        let ip_repr = IpRepr::new(
            tuple.local.addr,
            tuple.remote.addr,
            IpProtocol::Tcp,
            repr.buffer_len(),
            self.hop_limit.unwrap_or(64),
        );

        emit(cx, (ip_repr, repr))
    }

    /// Return the earliest time at which this socket should be polled again.
    pub(crate) fn poll_at(&self, _cx: &mut InterfaceInner) -> PollAt {
        if self.tuple.is_none() {
            return PollAt::Ingress;
        }
        match self.ack_delay_timer {
            AckDelayTimer::Immediate => return PollAt::Now,
            AckDelayTimer::Waiting(at) => return PollAt::Time(at),
            AckDelayTimer::Idle => {}
        }
        if self.state == State::Closed {
            return PollAt::Ingress;
        }
        self.timer.poll_at()
    }
}

impl<'a> fmt::Display for Socket<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn socket() -> Socket<'static> {
        Socket::new(vec![0u8; 64], vec![0u8; 64])
    }

    #[test]
    fn new_socket_is_closed() {
        let s = socket();
        assert_eq!(s.state(), State::Closed);
        assert!(!s.is_open());
    }

    #[test]
    fn listen_transitions_to_listen_state() {
        let mut s = socket();
        s.listen(80).unwrap();
        assert_eq!(s.state(), State::Listen);
        assert!(s.is_listening());
    }

    #[test]
    fn listen_rejects_port_zero() {
        let mut s = socket();
        assert_eq!(s.listen(0), Err(ListenError::Unaddressable));
    }

    #[test]
    fn close_from_listen_goes_to_closed() {
        let mut s = socket();
        s.listen(80).unwrap();
        s.close();
        assert_eq!(s.state(), State::Closed);
    }

    #[test]
    fn abort_always_closes() {
        let mut s = socket();
        s.listen(80).unwrap();
        s.abort();
        assert_eq!(s.state(), State::Closed);
    }

    #[test]
    fn send_slice_before_connect_is_rejected() {
        let mut s = socket();
        assert_eq!(s.send_slice(b"hi"), Err(SendError::InvalidState));
    }
}
