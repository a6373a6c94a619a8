//! The network core thread (spec §4.1): the single worker that owns all
//! transport state and drives the BSD socket surface (spec §4.5) above it.
//!
//! Grounded on `iface::interface::Interface::poll` for the per-tick ingress/
//! egress pump, and on the Design Note "Model as a single `Core` value owned
//! by the main thread and passed by reference to the worker; do not use
//! ambient globals" — concretely an `Arc<Mutex<Core<D>>>` plus a `Condvar`
//! the worker waits on, since this crate targets `std` rather than an RTOS.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use crate::bsd::dhcp::Hook as DhcpHook;
use crate::bsd::errno::Errno;
use crate::bsd::fd::{Family, FdTable, SockType, TransportHandle};
use crate::bsd::sockopt::{self, OptValue, SockOpt};
use crate::config::{TCP_DEFAULT_RX_BUFFER_SIZE, TCP_DEFAULT_TX_BUFFER_SIZE};
use crate::config::{UDP_RX_PAYLOAD_CAPACITY, UDP_RX_QUEUE_DEPTH};
use crate::iface::{Config, Interface, SocketHandle, SocketSet};
use crate::phy::Device;
use crate::socket::{tcp, udp};
use crate::storage::{PacketMetadata, RingBuffer};
use crate::time::Instant;
use crate::wire::{IpAddress, IpEndpoint, IpListenEndpoint};

fn bool_value(value: OptValue) -> Result<bool, Errno> {
    match value {
        OptValue::Bool(b) => Ok(b),
        _ => Err(Errno::Inval),
    }
}

fn byte_value(value: OptValue) -> Result<u8, Errno> {
    match value {
        OptValue::Byte(b) => Ok(b),
        _ => Err(Errno::Inval),
    }
}

/// Backlog bookkeeping for one listening FD. A real `tcp::Socket` has no
/// built-in backlog (see module docs below); this is the sibling-socket
/// pool that stands in for one.
struct Listener {
    /// Additional backlogged sockets beyond the listener FD's own handle,
    /// maintained at `backlog - 1` entries (spec §4.4.7).
    backlog: Vec<SocketHandle>,
    local_endpoint: IpListenEndpoint,
}

/// Per-UDP-FD "connected" peer, tracked here rather than inside
/// [`crate::socket::udp::Socket`] — the transport engine stays a plain
/// connectionless datagram queue (as the teacher designed it); the BSD
/// layer is what adds peer filtering on top, matching how `connect()` on a
/// real BSD UDP socket is itself just a filter over an otherwise
/// connectionless primitive.
#[derive(Default)]
struct UdpPeer(Option<IpEndpoint>);

/// The handful of socket options with no natural home on either `FdEntry`
/// or the sans-I/O transport socket (spec §4.5.4). Holding these here keeps
/// `tcp::Socket`/`udp::Socket` free of BSD-only concepts such as
/// `IPV6_V6ONLY`, matching how `UdpPeer` already keeps connect()'s peer
/// filter out of `udp::Socket`.
#[derive(Clone, Copy)]
struct ExtraOpts {
    keep_alive_enabled: bool,
    keep_idle: StdDuration,
    tos: u8,
    recv_dst_addr: bool,
    v6only: bool,
    flow_ctrl: bool,
}

impl Default for ExtraOpts {
    fn default() -> Self {
        ExtraOpts {
            keep_alive_enabled: false,
            // Linux's default TCP_KEEPIDLE.
            keep_idle: StdDuration::from_secs(7200),
            tos: 0,
            recv_dst_addr: false,
            v6only: true,
            flow_ctrl: false,
        }
    }
}

/// Owns the interface, the socket pool, and the FD table. Only the core
/// thread (see [`CoreHandle::spawn`]) mutates any of this once running;
/// the BSD entry points below either run directly (before the thread
/// starts) or are called by `CoreHandle` through the shared lock.
pub struct Core<D: Device> {
    iface: Interface,
    device: D,
    sockets: SocketSet<'static>,
    fds: FdTable,
    listeners: HashMap<i32, Listener>,
    udp_peers: HashMap<i32, UdpPeer>,
    sockopts: HashMap<i32, ExtraOpts>,
    dhcp_hook: Option<Box<dyn DhcpHook + Send>>,
    shutdown: bool,
}

impl<D: Device> Core<D> {
    pub fn new(config: Config, mut device: D, now: Instant) -> Self {
        let iface = Interface::new(config, &mut device, now);
        Core {
            iface,
            device,
            sockets: SocketSet::new(),
            fds: FdTable::new(),
            listeners: HashMap::new(),
            udp_peers: HashMap::new(),
            sockopts: HashMap::new(),
            dhcp_hook: None,
            shutdown: false,
        }
    }

    pub fn set_dhcp_hook(&mut self, hook: Box<dyn DhcpHook + Send>) {
        self.dhcp_hook = Some(hook);
    }

    pub fn interface(&mut self) -> &mut Interface {
        &mut self.iface
    }

    /// Run one iteration: drain ingress, advance timers (implicitly, via
    /// each transport comparing its own deadlines to `now` during egress),
    /// flush egress, and wake any waiter whose predicate may have changed.
    fn poll(&mut self, now: Instant) {
        use crate::iface::PollResult;

        if self.iface.poll(now, &mut self.device, &mut self.sockets) == PollResult::SocketStateChanged
        {
            for (_, entry) in self.fds.iter() {
                entry.waiter.notify();
            }
        }
    }

    fn next_poll_deadline(&mut self, now: Instant) -> Option<crate::time::Duration> {
        self.iface.poll_delay(now, &self.sockets)
    }

    // ---- socket() ----------------------------------------------------

    pub fn socket(&mut self, family: Family, ty: SockType) -> Result<i32, Errno> {
        let handle = match ty {
            SockType::Stream => {
                let rx = RingBuffer::new(vec![0u8; TCP_DEFAULT_RX_BUFFER_SIZE]);
                let tx = RingBuffer::new(vec![0u8; TCP_DEFAULT_TX_BUFFER_SIZE]);
                TransportHandle::Tcp(self.sockets.add(tcp::Socket::new(rx, tx)))
            }
            SockType::Dgram => {
                let rx = udp::PacketBuffer::new(
                    vec![PacketMetadata::EMPTY; UDP_RX_QUEUE_DEPTH],
                    vec![0u8; UDP_RX_QUEUE_DEPTH * UDP_RX_PAYLOAD_CAPACITY],
                );
                let tx = udp::PacketBuffer::new(
                    vec![PacketMetadata::EMPTY; UDP_RX_QUEUE_DEPTH],
                    vec![0u8; UDP_RX_QUEUE_DEPTH * UDP_RX_PAYLOAD_CAPACITY],
                );
                TransportHandle::Udp(self.sockets.add(udp::Socket::new(rx, tx)))
            }
        };
        self.fds.alloc(family, ty, handle).ok_or(Errno::NoMem)
    }

    // ---- bind() --------------------------------------------------------

    pub fn bind(&mut self, fd: i32, endpoint: IpListenEndpoint) -> Result<(), Errno> {
        if self.port_in_use(endpoint) {
            return Err(Errno::AddrInUse);
        }
        let handle = self.fds.get(fd).ok_or(Errno::Sock)?.handle;
        match handle {
            TransportHandle::Tcp(_) => Err(Errno::Inval), // bound implicitly by listen()/connect()
            TransportHandle::Udp(h) => {
                let socket: &mut udp::Socket = self.sockets.get_mut(h);
                socket.bind(endpoint).map_err(|_| Errno::Inval)
            }
        }
    }

    fn port_in_use(&self, endpoint: IpListenEndpoint) -> bool {
        if endpoint.port == 0 {
            return false;
        }
        self.fds.iter().any(|(_, entry)| match entry.handle {
            TransportHandle::Udp(h) => {
                let s: &udp::Socket = self.sockets.get(h);
                s.endpoint().port == endpoint.port
            }
            TransportHandle::Tcp(h) => {
                let s: &tcp::Socket = self.sockets.get(h);
                s.local_endpoint()
                    .is_some_and(|e| e.port == endpoint.port)
            }
        })
    }

    // ---- listen()/accept() --------------------------------------------

    /// Re-listen on an already-listening socket's own endpoint, e.g. after
    /// a caller wants to grow the backlog. Fails if the socket was never
    /// given an endpoint via [`Core::listen_with_endpoint`].
    pub fn listen(&mut self, fd: i32, backlog: usize) -> Result<(), Errno> {
        let handle = match self.fds.get(fd).ok_or(Errno::Sock)?.handle {
            TransportHandle::Tcp(h) => h,
            TransportHandle::Udp(_) => return Err(Errno::NotSup),
        };
        let endpoint = self
            .listeners
            .get(&fd)
            .map(|l| l.local_endpoint)
            .or_else(|| {
                let s: &tcp::Socket = self.sockets.get(handle);
                s.local_endpoint().map(Into::into)
            })
            .ok_or(Errno::Inval)?;
        self.listen_on(fd, handle, backlog, endpoint)
    }

    /// `listen` taking an explicit local endpoint, for callers (like
    /// `socket()+bind()+listen()` chains) that already picked one.
    pub fn listen_with_endpoint(
        &mut self,
        fd: i32,
        endpoint: IpListenEndpoint,
        backlog: usize,
    ) -> Result<(), Errno> {
        let handle = match self.fds.get(fd).ok_or(Errno::Sock)?.handle {
            TransportHandle::Tcp(h) => h,
            TransportHandle::Udp(_) => return Err(Errno::NotSup),
        };
        self.listen_on(fd, handle, backlog, endpoint)
    }

    fn listen_on(
        &mut self,
        fd: i32,
        handle: SocketHandle,
        backlog: usize,
        endpoint: IpListenEndpoint,
    ) -> Result<(), Errno> {
        {
            let s: &mut tcp::Socket = self.sockets.get_mut(handle);
            s.listen(endpoint).map_err(|_| Errno::Inval)?;
        }

        let mut spares = Vec::new();
        for _ in 1..backlog.max(1) {
            let rx = RingBuffer::new(vec![0u8; TCP_DEFAULT_RX_BUFFER_SIZE]);
            let tx = RingBuffer::new(vec![0u8; TCP_DEFAULT_TX_BUFFER_SIZE]);
            let spare_handle = self.sockets.add(tcp::Socket::new(rx, tx));
            let s: &mut tcp::Socket = self.sockets.get_mut(spare_handle);
            let _ = s.listen(endpoint);
            spares.push(spare_handle);
        }

        self.listeners.insert(
            fd,
            Listener {
                backlog: spares,
                local_endpoint: endpoint,
            },
        );
        Ok(())
    }

    pub fn accept(&mut self, fd: i32) -> Result<i32, Errno> {
        let entry_handle = match self.fds.get(fd).ok_or(Errno::Sock)?.handle {
            TransportHandle::Tcp(h) => h,
            TransportHandle::Udp(_) => return Err(Errno::NotSup),
        };
        let family = self.fds.get(fd).unwrap().family;

        let listener = self.listeners.get(&fd).ok_or(Errno::Inval)?;
        let local_endpoint = listener.local_endpoint;

        // Check the listener FD's own handle first, then the backlog.
        let mut candidates = vec![entry_handle];
        candidates.extend(listener.backlog.iter().copied());

        let ready = candidates.into_iter().find(|&h| {
            let s: &tcp::Socket = self.sockets.get(h);
            s.is_active() && !s.is_listening()
        });

        // Blocking retry (if the FD isn't O_NONBLOCK) happens one layer up,
        // in `CoreHandle::accept`, by waiting on the listener's `Waiter`.
        let Some(accepted) = ready else {
            return Err(Errno::WouldBlock);
        };

        let replacement = {
            let rx = RingBuffer::new(vec![0u8; TCP_DEFAULT_RX_BUFFER_SIZE]);
            let tx = RingBuffer::new(vec![0u8; TCP_DEFAULT_TX_BUFFER_SIZE]);
            let h = self.sockets.add(tcp::Socket::new(rx, tx));
            let s: &mut tcp::Socket = self.sockets.get_mut(h);
            let _ = s.listen(local_endpoint);
            h
        };

        if accepted == entry_handle {
            // The listener FD's own handle was the one that connected;
            // keep the FD number stable by swapping in the replacement
            // for the *original* FD and handing the caller a fresh FD for
            // the connection.
            self.fds.get_mut(fd).unwrap().handle = TransportHandle::Tcp(replacement);
        } else {
            let listener = self.listeners.get_mut(&fd).unwrap();
            listener.backlog.retain(|&h| h != accepted);
            listener.backlog.push(replacement);
        }

        self.fds
            .alloc(family, SockType::Stream, TransportHandle::Tcp(accepted))
            .ok_or(Errno::NoMem)
    }

    // ---- connect() ------------------------------------------------------

    pub fn connect(&mut self, fd: i32, remote: IpEndpoint) -> Result<(), Errno> {
        let handle = self.fds.get(fd).ok_or(Errno::Sock)?.handle;
        match handle {
            TransportHandle::Tcp(h) => {
                let cx = self.iface.context();
                let s: &mut tcp::Socket = self.sockets.get_mut(h);
                s.connect(cx, remote, IpListenEndpoint::default())
                    .map_err(|_| Errno::Inval)
            }
            TransportHandle::Udp(_) => {
                if remote.addr.is_unspecified() {
                    self.udp_peers.insert(fd, UdpPeer(None));
                } else {
                    self.udp_peers.insert(fd, UdpPeer(Some(remote)));
                }
                Ok(())
            }
        }
    }

    // ---- send()/recv() ---------------------------------------------------

    pub fn send(&mut self, fd: i32, data: &[u8]) -> Result<usize, Errno> {
        if data.is_empty() {
            return Err(Errno::Inval);
        }
        let handle = self.fds.get(fd).ok_or(Errno::Sock)?.handle;
        match handle {
            TransportHandle::Tcp(h) => {
                let s: &mut tcp::Socket = self.sockets.get_mut(h);
                if !s.may_send() {
                    return Err(Errno::NotConn);
                }
                s.send_slice(data).map_err(|_| Errno::NotConn)
            }
            TransportHandle::Udp(h) => {
                let peer = self
                    .udp_peers
                    .get(&fd)
                    .and_then(|p| p.0)
                    .ok_or(Errno::DestAddrReq)?;
                let s: &mut udp::Socket = self.sockets.get_mut(h);
                s.send_slice(data, peer).map_err(|e| match e {
                    udp::SendError::Unaddressable => Errno::DestAddrReq,
                    udp::SendError::BufferFull => Errno::MsgSize,
                })?;
                Ok(data.len())
            }
        }
    }

    pub fn sendto(&mut self, fd: i32, data: &[u8], to: IpEndpoint) -> Result<usize, Errno> {
        if data.is_empty() {
            return Err(Errno::Inval);
        }
        let handle = self.fds.get(fd).ok_or(Errno::Sock)?.handle;
        match handle {
            TransportHandle::Tcp(_) => Err(Errno::Inval),
            TransportHandle::Udp(h) => {
                let s: &mut udp::Socket = self.sockets.get_mut(h);
                s.send_slice(data, to).map_err(|e| match e {
                    udp::SendError::Unaddressable => Errno::DestAddrReq,
                    udp::SendError::BufferFull => Errno::MsgSize,
                })?;
                Ok(data.len())
            }
        }
    }

    pub fn recv(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize, Errno> {
        if buf.is_empty() {
            return Err(Errno::Inval);
        }
        let handle = self.fds.get(fd).ok_or(Errno::Sock)?.handle;
        match handle {
            TransportHandle::Tcp(h) => {
                let s: &mut tcp::Socket = self.sockets.get_mut(h);
                if !s.may_recv() && s.recv_queue() == 0 {
                    return Ok(0); // EOF
                }
                s.recv_slice(buf).map_err(|_| Errno::ConnReset)
            }
            TransportHandle::Udp(h) => {
                let peer_filter = self.udp_peers.get(&fd).and_then(|p| p.0);
                let s: &mut udp::Socket = self.sockets.get_mut(h);
                loop {
                    let (len, meta) = s.recv_slice(buf).map_err(|_| Errno::WouldBlock)?;
                    if peer_filter.map_or(true, |p| p == meta.endpoint) {
                        return Ok(len);
                    }
                    // Connected socket: silently discard datagrams from
                    // any other peer and try the next one.
                }
            }
        }
    }

    pub fn recvfrom(&mut self, fd: i32, buf: &mut [u8]) -> Result<(usize, IpEndpoint), Errno> {
        let handle = self.fds.get(fd).ok_or(Errno::Sock)?.handle;
        match handle {
            TransportHandle::Tcp(_) => Err(Errno::NotSup),
            TransportHandle::Udp(h) => {
                let s: &mut udp::Socket = self.sockets.get_mut(h);
                let (len, meta) = s.recv_slice(buf).map_err(|_| Errno::WouldBlock)?;
                Ok((len, meta.endpoint))
            }
        }
    }

    // ---- getsockname()/getpeername() -------------------------------------

    pub fn getsockname(&self, fd: i32) -> Result<IpEndpoint, Errno> {
        let handle = self.fds.get(fd).ok_or(Errno::Sock)?.handle;
        match handle {
            TransportHandle::Tcp(h) => {
                let s: &tcp::Socket = self.sockets.get(h);
                s.local_endpoint().ok_or(Errno::NotConn)
            }
            TransportHandle::Udp(h) => {
                let s: &udp::Socket = self.sockets.get(h);
                let ep = s.endpoint();
                Ok(IpEndpoint::new(
                    ep.addr.unwrap_or(IpAddress::v4(0, 0, 0, 0)),
                    ep.port,
                ))
            }
        }
    }

    pub fn getpeername(&self, fd: i32) -> Result<IpEndpoint, Errno> {
        let handle = self.fds.get(fd).ok_or(Errno::Sock)?.handle;
        match handle {
            TransportHandle::Tcp(h) => {
                let s: &tcp::Socket = self.sockets.get(h);
                s.remote_endpoint().ok_or(Errno::NotConn)
            }
            TransportHandle::Udp(_) => self
                .udp_peers
                .get(&fd)
                .and_then(|p| p.0)
                .ok_or(Errno::NotConn),
        }
    }

    // ---- closesocket() ----------------------------------------------------

    pub fn close(&mut self, fd: i32) -> Result<(), Errno> {
        let entry = self.fds.close(fd).ok_or(Errno::Sock)?;
        match entry.handle {
            TransportHandle::Tcp(h) => {
                let s: &mut tcp::Socket = self.sockets.get_mut(h);
                s.close();
            }
            TransportHandle::Udp(h) => {
                let s: &mut udp::Socket = self.sockets.get_mut(h);
                s.close();
                self.sockets.remove(h);
            }
        }
        if let Some(listener) = self.listeners.remove(&fd) {
            for h in listener.backlog {
                self.sockets.remove(h);
            }
        }
        self.udp_peers.remove(&fd);
        self.sockopts.remove(&fd);
        entry.waiter.notify();
        Ok(())
    }

    // ---- setsockopt()/getsockopt()/ioctlsocket(FIONBIO) -------------------

    /// Toggle `O_NONBLOCK`/`FIONBIO` on a FD (spec §4.5.2).
    pub fn set_nonblocking(&mut self, fd: i32, non_blocking: bool) -> Result<(), Errno> {
        let entry = self.fds.get_mut(fd).ok_or(Errno::Sock)?;
        entry.non_blocking = non_blocking;
        Ok(())
    }

    pub fn setsockopt(&mut self, fd: i32, opt: SockOpt, value: OptValue) -> Result<(), Errno> {
        let handle = self.fds.get(fd).ok_or(Errno::Sock)?.handle;
        match opt {
            SockOpt::SoRcvTimeo | SockOpt::SoSndTimeo | SockOpt::SoBindToDevice | SockOpt::SoType => {
                let entry = self.fds.get_mut(fd).unwrap();
                sockopt::set(entry, opt, value)
            }
            SockOpt::IpTtl | SockOpt::Ipv6MulticastHops => {
                let ttl = byte_value(value)?;
                match handle {
                    TransportHandle::Tcp(h) => {
                        let s: &mut tcp::Socket = self.sockets.get_mut(h);
                        s.set_hop_limit(Some(ttl.max(1)));
                    }
                    TransportHandle::Udp(h) => {
                        let s: &mut udp::Socket = self.sockets.get_mut(h);
                        s.set_hop_limit(Some(ttl.max(1)));
                    }
                }
                Ok(())
            }
            SockOpt::SoKeepAlive => {
                let enabled = bool_value(value)?;
                let idle = self.sockopts.entry(fd).or_default().keep_idle;
                self.sockopts.get_mut(&fd).unwrap().keep_alive_enabled = enabled;
                if let TransportHandle::Tcp(h) = handle {
                    let s: &mut tcp::Socket = self.sockets.get_mut(h);
                    s.set_keep_alive(enabled.then(|| idle.into()));
                }
                Ok(())
            }
            SockOpt::TcpKeepIdle => {
                let secs = match value {
                    OptValue::SecondsU32(s) => s,
                    _ => return Err(Errno::Inval),
                };
                let idle = StdDuration::from_secs(secs as u64);
                let opts = self.sockopts.entry(fd).or_default();
                opts.keep_idle = idle;
                let enabled = opts.keep_alive_enabled;
                if enabled {
                    if let TransportHandle::Tcp(h) = handle {
                        let s: &mut tcp::Socket = self.sockets.get_mut(h);
                        s.set_keep_alive(Some(idle.into()));
                    }
                }
                Ok(())
            }
            SockOpt::TcpQuickAck => {
                let enabled = bool_value(value)?;
                let TransportHandle::Tcp(h) = handle else {
                    return Err(Errno::NotSup);
                };
                let s: &mut tcp::Socket = self.sockets.get_mut(h);
                s.set_ack_delay(if enabled {
                    None
                } else {
                    Some(crate::config::TCP_DELAYED_ACK_TIMEOUT)
                });
                Ok(())
            }
            SockOpt::TcpFlowCtrl => {
                let enabled = bool_value(value)?;
                let TransportHandle::Tcp(h) = handle else {
                    return Err(Errno::NotSup);
                };
                let s: &mut tcp::Socket = self.sockets.get_mut(h);
                s.set_nagle_enabled(!enabled);
                self.sockopts.entry(fd).or_default().flow_ctrl = enabled;
                Ok(())
            }
            SockOpt::IpTos | SockOpt::Ipv6TClass => {
                self.sockopts.entry(fd).or_default().tos = byte_value(value)?;
                Ok(())
            }
            SockOpt::IpRecvDstAddr | SockOpt::Ipv6RecvDstAddr => {
                self.sockopts.entry(fd).or_default().recv_dst_addr = bool_value(value)?;
                Ok(())
            }
            SockOpt::Ipv6V6Only => {
                self.sockopts.entry(fd).or_default().v6only = bool_value(value)?;
                Ok(())
            }
        }
    }

    pub fn getsockopt(&self, fd: i32, opt: SockOpt) -> Result<OptValue, Errno> {
        let handle = self.fds.get(fd).ok_or(Errno::Sock)?.handle;
        match opt {
            SockOpt::SoRcvTimeo | SockOpt::SoSndTimeo | SockOpt::SoBindToDevice | SockOpt::SoType => {
                sockopt::get(self.fds.get(fd).unwrap(), opt)
            }
            SockOpt::IpTtl | SockOpt::Ipv6MulticastHops => {
                let ttl = match handle {
                    TransportHandle::Tcp(h) => {
                        let s: &tcp::Socket = self.sockets.get(h);
                        s.hop_limit()
                    }
                    TransportHandle::Udp(h) => {
                        let s: &udp::Socket = self.sockets.get(h);
                        s.hop_limit()
                    }
                };
                Ok(OptValue::Byte(ttl.unwrap_or(64)))
            }
            SockOpt::SoKeepAlive => Ok(OptValue::Bool(
                self.sockopts.get(&fd).copied().unwrap_or_default().keep_alive_enabled,
            )),
            SockOpt::TcpKeepIdle => Ok(OptValue::SecondsU32(
                self.sockopts
                    .get(&fd)
                    .copied()
                    .unwrap_or_default()
                    .keep_idle
                    .as_secs() as u32,
            )),
            SockOpt::TcpQuickAck => {
                let enabled = match handle {
                    TransportHandle::Tcp(h) => {
                        let s: &tcp::Socket = self.sockets.get(h);
                        s.ack_delay().is_none()
                    }
                    TransportHandle::Udp(_) => return Err(Errno::NotSup),
                };
                Ok(OptValue::Bool(enabled))
            }
            SockOpt::TcpFlowCtrl => {
                if !matches!(handle, TransportHandle::Tcp(_)) {
                    return Err(Errno::NotSup);
                }
                Ok(OptValue::Bool(
                    self.sockopts.get(&fd).copied().unwrap_or_default().flow_ctrl,
                ))
            }
            SockOpt::IpTos | SockOpt::Ipv6TClass => Ok(OptValue::Byte(
                self.sockopts.get(&fd).copied().unwrap_or_default().tos,
            )),
            SockOpt::IpRecvDstAddr | SockOpt::Ipv6RecvDstAddr => Ok(OptValue::Bool(
                self.sockopts.get(&fd).copied().unwrap_or_default().recv_dst_addr,
            )),
            SockOpt::Ipv6V6Only => Ok(OptValue::Bool(
                self.sockopts.get(&fd).copied().unwrap_or_default().v6only,
            )),
        }
    }

    // ---- select() readiness -----------------------------------------------

    pub fn readable(&self, fd: i32) -> bool {
        match self.fds.get(fd).map(|e| e.handle) {
            Some(TransportHandle::Tcp(h)) => {
                let s: &tcp::Socket = self.sockets.get(h);
                s.can_recv() || !s.may_recv()
            }
            Some(TransportHandle::Udp(h)) => {
                let s: &udp::Socket = self.sockets.get(h);
                s.can_recv()
            }
            None => false,
        }
    }

    pub fn writable(&self, fd: i32) -> bool {
        match self.fds.get(fd).map(|e| e.handle) {
            Some(TransportHandle::Tcp(h)) => {
                let s: &tcp::Socket = self.sockets.get(h);
                s.may_send() && s.can_send()
            }
            Some(TransportHandle::Udp(h)) => {
                let s: &udp::Socket = self.sockets.get(h);
                s.can_send()
            }
            None => false,
        }
    }

    pub fn has_error(&self, fd: i32) -> bool {
        self.fds.get(fd).is_some_and(|e| e.error.is_some())
    }
}

/// State shared between `CoreHandle` clones and the core thread.
struct Shared<D: Device> {
    core: Mutex<Core<D>>,
    wake: Condvar,
}

/// A cloneable handle to the running core thread. BSD entry points are
/// methods on this handle; they take the lock for the duration of the call
/// only, matching "any per-socket lock is only to serialise concurrent
/// user threads on the *same* FD" (spec §4.1) in spirit, simplified to a
/// single coarse lock since the core thread itself never blocks while
/// holding it.
pub struct CoreHandle<D: Device> {
    shared: Arc<Shared<D>>,
}

impl<D: Device> Clone for CoreHandle<D> {
    fn clone(&self) -> Self {
        CoreHandle {
            shared: self.shared.clone(),
        }
    }
}

impl<D: Device + Send + 'static> CoreHandle<D> {
    pub fn new(core: Core<D>) -> Self {
        CoreHandle {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                wake: Condvar::new(),
            }),
        }
    }

    fn with_core<R>(&self, f: impl FnOnce(&mut Core<D>) -> R) -> R {
        let mut core = self.shared.core.lock().unwrap();
        f(&mut core)
    }

    /// Request the core thread to stop after its current tick.
    pub fn request_shutdown(&self) {
        self.with_core(|c| c.shutdown = true);
        self.shared.wake.notify_all();
    }

    /// Spawn the core thread (spec §4.1's "single cooperative worker").
    pub fn spawn(&self) -> JoinHandle<()> {
        let handle = self.clone();
        std::thread::spawn(move || handle.run())
    }

    fn run(&self) {
        loop {
            let now = Instant::now();
            let (delay, shutdown) = self.with_core(|core| {
                core.poll(now);
                (core.next_poll_deadline(now), core.shutdown)
            });
            if shutdown {
                return;
            }

            let default_tick: StdDuration = crate::config::TIMER_TICK.into();
            let tick = delay
                .map(StdDuration::from)
                .unwrap_or(default_tick)
                .min(default_tick);

            let guard = self.shared.core.lock().unwrap();
            let _ = self.shared.wake.wait_timeout(guard, tick).unwrap();
        }
    }

    pub fn socket(&self, family: Family, ty: SockType) -> Result<i32, Errno> {
        self.with_core(|c| c.socket(family, ty))
    }

    pub fn bind(&self, fd: i32, endpoint: IpListenEndpoint) -> Result<(), Errno> {
        self.with_core(|c| c.bind(fd, endpoint))
    }

    pub fn listen(&self, fd: i32, endpoint: IpListenEndpoint, backlog: usize) -> Result<(), Errno> {
        self.with_core(|c| c.listen_with_endpoint(fd, endpoint, backlog))
    }

    /// Blocking accept: waits on the listener FD's [`Waiter`] until a
    /// connection is ready, `SO_RCVTIMEO` elapses, or the FD is
    /// non-blocking (single immediate attempt).
    pub fn accept(&self, fd: i32) -> Result<i32, Errno> {
        loop {
            let (result, non_blocking, rcvtimeo) = self.with_core(|c| {
                let r = c.accept(fd);
                let entry = c.fds.get(fd);
                (
                    r,
                    entry.map(|e| e.non_blocking).unwrap_or(true),
                    entry.and_then(|e| e.rcvtimeo),
                )
            });
            match result {
                Err(Errno::WouldBlock) if !non_blocking => {
                    if !self.wait_fd(fd, rcvtimeo) {
                        return Err(Errno::TimedOut);
                    }
                }
                other => return other,
            }
        }
    }

    pub fn connect(&self, fd: i32, remote: IpEndpoint) -> Result<(), Errno> {
        self.with_core(|c| c.connect(fd, remote))
    }

    pub fn send(&self, fd: i32, data: &[u8]) -> Result<usize, Errno> {
        self.with_core(|c| c.send(fd, data))
    }

    pub fn sendto(&self, fd: i32, data: &[u8], to: IpEndpoint) -> Result<usize, Errno> {
        self.with_core(|c| c.sendto(fd, data, to))
    }

    pub fn recv(&self, fd: i32, buf: &mut [u8]) -> Result<usize, Errno> {
        self.with_core(|c| c.recv(fd, buf))
    }

    pub fn recvfrom(&self, fd: i32, buf: &mut [u8]) -> Result<(usize, IpEndpoint), Errno> {
        self.with_core(|c| c.recvfrom(fd, buf))
    }

    pub fn getsockname(&self, fd: i32) -> Result<IpEndpoint, Errno> {
        self.with_core(|c| c.getsockname(fd))
    }

    pub fn getpeername(&self, fd: i32) -> Result<IpEndpoint, Errno> {
        self.with_core(|c| c.getpeername(fd))
    }

    pub fn close(&self, fd: i32) -> Result<(), Errno> {
        self.with_core(|c| c.close(fd))
    }

    pub fn set_nonblocking(&self, fd: i32, non_blocking: bool) -> Result<(), Errno> {
        self.with_core(|c| c.set_nonblocking(fd, non_blocking))
    }

    pub fn setsockopt(&self, fd: i32, opt: SockOpt, value: OptValue) -> Result<(), Errno> {
        self.with_core(|c| c.setsockopt(fd, opt, value))
    }

    pub fn getsockopt(&self, fd: i32, opt: SockOpt) -> Result<OptValue, Errno> {
        self.with_core(|c| c.getsockopt(fd, opt))
    }

    /// `select`: snapshot predicates for every listed FD, blocking until at
    /// least one is satisfied or `timeout` elapses (spec §4.5.3).
    pub fn select(
        &self,
        read: &crate::bsd::select::FdSet,
        write: &crate::bsd::select::FdSet,
        error: &crate::bsd::select::FdSet,
        timeout: Option<StdDuration>,
    ) -> Result<
        (
            crate::bsd::select::FdSet,
            crate::bsd::select::FdSet,
            crate::bsd::select::FdSet,
        ),
        Errno,
    > {
        if read.is_empty() && write.is_empty() && error.is_empty() {
            return Err(Errno::Inval);
        }
        let deadline = timeout.map(|t| std::time::Instant::now() + t);
        loop {
            let (r, w, e, any) = self.with_core(|c| {
                let mut r = crate::bsd::select::FdSet::empty();
                let mut w = crate::bsd::select::FdSet::empty();
                let mut e = crate::bsd::select::FdSet::empty();
                let mut any = false;
                for fd in read.iter() {
                    if c.readable(fd) {
                        r.set(fd);
                        any = true;
                    }
                }
                for fd in write.iter() {
                    if c.writable(fd) {
                        w.set(fd);
                        any = true;
                    }
                }
                for fd in error.iter() {
                    if c.has_error(fd) {
                        e.set(fd);
                        any = true;
                    }
                }
                (r, w, e, any)
            });
            if any || timeout == Some(StdDuration::ZERO) {
                return Ok((r, w, e));
            }
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                if remaining.is_zero() {
                    return Ok((r, w, e));
                }
                std::thread::sleep(remaining.min(StdDuration::from_millis(50)));
                if std::time::Instant::now() >= deadline {
                    return Ok((r, w, e));
                }
            } else {
                std::thread::sleep(StdDuration::from_millis(50));
            }
        }
    }

    fn wait_fd(&self, fd: i32, timeout: Option<StdDuration>) -> bool {
        let Some(waiter) = self.with_core(|c| c.fds.get(fd).map(|e| e.waiter.clone())) else {
            return false;
        };
        waiter.wait(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::{Loopback, Medium};
    use crate::wire::{EthernetAddress, HardwareAddress, Ipv4Address};

    fn core() -> Core<Loopback> {
        let device = Loopback::new(Medium::Ethernet, 1514);
        let config = Config::new(HardwareAddress::Ethernet(EthernetAddress::from_bytes(&[
            2, 0, 0, 0, 0, 1,
        ])));
        Core::new(config, device, Instant::from_millis(0))
    }

    #[test]
    fn socket_then_bind_then_getsockname() {
        let mut core = core();
        let fd = core.socket(Family::Inet, SockType::Dgram).unwrap();
        core.bind(fd, 9000.into()).unwrap();
        let name = core.getsockname(fd).unwrap();
        assert_eq!(name.port, 9000);
    }

    #[test]
    fn double_bind_same_port_is_addr_in_use() {
        let mut core = core();
        let fd1 = core.socket(Family::Inet, SockType::Dgram).unwrap();
        core.bind(fd1, 9001.into()).unwrap();
        let fd2 = core.socket(Family::Inet, SockType::Dgram).unwrap();
        assert_eq!(core.bind(fd2, 9001.into()), Err(Errno::AddrInUse));
    }

    #[test]
    fn close_then_any_op_is_esock() {
        let mut core = core();
        let fd = core.socket(Family::Inet, SockType::Dgram).unwrap();
        core.close(fd).unwrap();
        assert_eq!(core.close(fd), Err(Errno::Sock));
        assert_eq!(core.getsockname(fd), Err(Errno::Sock));
    }

    #[test]
    fn listen_on_datagram_socket_is_not_supported() {
        let mut core = core();
        let fd = core.socket(Family::Inet, SockType::Dgram).unwrap();
        assert_eq!(
            core.listen_with_endpoint(fd, 80.into(), 4),
            Err(Errno::NotSup)
        );
    }

    #[test]
    fn tcp_listener_pre_allocates_backlog() {
        let mut core = core();
        let fd = core.socket(Family::Inet, SockType::Stream).unwrap();
        core.listen_with_endpoint(fd, 7.into(), 4).unwrap();
        assert_eq!(core.listeners.get(&fd).unwrap().backlog.len(), 3);
        // Nothing connected yet.
        assert_eq!(core.accept(fd), Err(Errno::WouldBlock));
    }

    #[test]
    fn connect_on_udp_records_peer_and_recv_filters() {
        let mut core = core();
        let fd = core.socket(Family::Inet, SockType::Dgram).unwrap();
        core.bind(fd, 9002.into()).unwrap();
        let peer = IpEndpoint::new(IpAddress::Ipv4(Ipv4Address::new(127, 0, 0, 1)), 9);
        core.connect(fd, peer).unwrap();
        assert_eq!(core.getpeername(fd), Ok(peer));
    }

    #[test]
    fn sockopt_round_trips_for_every_rw_option() {
        let mut core = core();
        let fd = core.socket(Family::Inet, SockType::Stream).unwrap();

        let cases = [
            (SockOpt::SoKeepAlive, OptValue::Bool(true)),
            (SockOpt::IpTtl, OptValue::Byte(42)),
            (SockOpt::Ipv6TClass, OptValue::Byte(7)),
            (SockOpt::Ipv6MulticastHops, OptValue::Byte(3)),
            (SockOpt::Ipv6V6Only, OptValue::Bool(false)),
            (SockOpt::TcpQuickAck, OptValue::Bool(true)),
            (SockOpt::TcpFlowCtrl, OptValue::Bool(true)),
            (SockOpt::TcpKeepIdle, OptValue::SecondsU32(30)),
        ];
        for (opt, value) in cases {
            core.setsockopt(fd, opt, value).unwrap();
            assert_eq!(core.getsockopt(fd, opt), Ok(value), "{opt:?} did not round-trip");
        }
    }

    #[test]
    fn ioctlsocket_fionbio_toggles_non_blocking() {
        let mut core = core();
        let fd = core.socket(Family::Inet, SockType::Dgram).unwrap();
        assert!(!core.fds.get(fd).unwrap().non_blocking);
        core.set_nonblocking(fd, true).unwrap();
        assert!(core.fds.get(fd).unwrap().non_blocking);
    }
}
