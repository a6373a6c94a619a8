//! Socket front ends: the per-connection/per-endpoint state machines that
//! sit on top of [`crate::iface::Interface`]'s IP dispatch.
//!
//! Every socket type here is sans-I/O: it never touches a device directly.
//! Instead each exposes `accepts`/`process`/`dispatch`/`poll_at`, which the
//! interface calls during ingress and egress processing.

pub mod icmp;
pub mod raw;
pub mod tcp;
pub mod udp;

use crate::time::Instant;

/// Used by [`crate::iface::Interface::poll_at`] to know what to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollAt {
    /// Dispatch as soon as possible.
    Now,
    /// Dispatch at the given monotonic time.
    Time(Instant),
    /// Nothing to dispatch until more ingress arrives; don't poll on a timer.
    Ingress,
}

/// A network socket.
///
/// This enumeration abstracts the various types of sockets based on the
/// transport layer protocol. Read the documentation on the socket types
/// for more details.
#[derive(Debug)]
pub enum Socket<'a> {
    Raw(raw::Socket<'a>),
    Icmp(icmp::Socket<'a>),
    Udp(udp::Socket<'a>),
    Tcp(tcp::Socket<'a>),
}

impl<'a> Socket<'a> {
    pub(crate) fn poll_at(&mut self, cx: &mut crate::iface::InterfaceInner) -> PollAt {
        match self {
            Socket::Raw(s) => s.poll_at(cx),
            Socket::Icmp(s) => s.poll_at(cx),
            Socket::Udp(s) => s.poll_at(cx),
            Socket::Tcp(s) => s.poll_at(cx),
        }
    }
}

/// A trait implemented by each concrete socket type, to allow casting
/// through a [`Socket`] enum value.
///
/// This is used to enable [`crate::iface::SocketSet::get`] and
/// [`crate::iface::SocketSet::get_mut`].
pub trait AnySocket<'a> {
    fn downcast(socket: &Socket<'a>) -> Option<&Self>;
    fn downcast_mut(socket: &mut Socket<'a>) -> Option<&mut Self>;
}

macro_rules! impl_any_socket {
    ($variant:ident => $ty:ty) => {
        impl<'a> AnySocket<'a> for $ty {
            fn downcast(socket: &Socket<'a>) -> Option<&Self> {
                match socket {
                    Socket::$variant(s) => Some(s),
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }

            fn downcast_mut(socket: &mut Socket<'a>) -> Option<&mut Self> {
                match socket {
                    Socket::$variant(s) => Some(s),
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }
        }

        impl<'a> From<$ty> for Socket<'a> {
            fn from(socket: $ty) -> Self {
                Socket::$variant(socket)
            }
        }
    };
}

impl_any_socket!(Raw => raw::Socket<'a>);
impl_any_socket!(Icmp => icmp::Socket<'a>);
impl_any_socket!(Udp => udp::Socket<'a>);
impl_any_socket!(Tcp => tcp::Socket<'a>);
