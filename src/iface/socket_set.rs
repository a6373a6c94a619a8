use core::fmt;

use heapless::Vec;

use super::socket_meta::Meta;
use crate::config::{TCP_SOCKET_COUNT, UDP_SOCKET_COUNT};
use crate::socket::{AnySocket, Socket};

/// An opaque handle to a socket stored in a [`SocketSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle(usize);

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Total number of socket slots: one pool shared between TCP and UDP/ICMP/raw
/// control blocks, sized from the fixed pool counts in [`crate::config`].
const SOCKET_SET_CAPACITY: usize = TCP_SOCKET_COUNT + UDP_SOCKET_COUNT;

pub(crate) struct Item<'a> {
    pub(crate) meta: Meta,
    pub(crate) socket: Socket<'a>,
}

/// A fixed-capacity set of sockets, indexed via [`SocketHandle`].
///
/// This is the fixed-size analogue of a `Vec<Socket>`: sockets are added and
/// removed, but the slot count never grows past the pool configured at
/// compile time (`TCP_SOCKET_COUNT + UDP_SOCKET_COUNT`). Once a slot is
/// freed, its handle must not be reused by the caller.
pub struct SocketSet<'a> {
    sockets: Vec<Option<Item<'a>>, SOCKET_SET_CAPACITY>,
}

impl<'a> SocketSet<'a> {
    /// Create an empty set.
    pub fn new() -> Self {
        let mut sockets = Vec::new();
        while sockets.push(None).is_ok() {}
        Self { sockets }
    }

    /// Add a socket to the set, and return its handle.
    ///
    /// # Panics
    /// Panics if the pool is exhausted.
    pub fn add<T: Into<Socket<'a>>>(&mut self, socket: T) -> SocketHandle {
        let socket = socket.into();

        let slot = self
            .sockets
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .expect("adding a socket to a full SocketSet");

        let handle = SocketHandle(slot.0);
        *slot.1 = Some(Item {
            meta: Meta::new(handle),
            socket,
        });
        handle
    }

    /// Get a socket from the set by its handle, as mutable.
    ///
    /// # Panics
    /// Panics if the handle does not belong to this set, or the socket has
    /// wrong type.
    pub fn get_mut<T: AnySocket<'a>>(&mut self, handle: SocketHandle) -> &mut T {
        match self.sockets[handle.0].as_mut() {
            Some(item) => T::downcast_mut(&mut item.socket).expect("handle refers to a socket of a wrong type"),
            None => panic!("handle does not refer to a valid socket"),
        }
    }

    /// Get a socket from the set by its handle.
    ///
    /// # Panics
    /// Panics if the handle does not belong to this set, or the socket has
    /// wrong type.
    pub fn get<T: AnySocket<'a>>(&self, handle: SocketHandle) -> &T {
        match self.sockets[handle.0].as_ref() {
            Some(item) => T::downcast(&item.socket).expect("handle refers to a socket of a wrong type"),
            None => panic!("handle does not refer to a valid socket"),
        }
    }

    /// Remove a socket from the set, without any deinitialization.
    ///
    /// # Panics
    /// Panics if the handle does not belong to this set.
    pub fn remove(&mut self, handle: SocketHandle) -> Socket<'a> {
        let item = self.sockets[handle.0]
            .take()
            .expect("handle does not refer to a valid socket");
        item.socket
    }

    /// Get an iterator to the inner sockets.
    pub fn iter(&self) -> impl Iterator<Item = (SocketHandle, &Socket<'a>)> {
        self.items().map(|i| (i.meta.handle, &i.socket))
    }

    /// Get a mutable iterator to the inner sockets.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SocketHandle, &mut Socket<'a>)> {
        self.items_mut().map(|i| (i.meta.handle, &mut i.socket))
    }

    pub(crate) fn items(&self) -> impl Iterator<Item = &Item<'a>> + '_ {
        self.sockets.iter().filter_map(|x| x.as_ref())
    }

    pub(crate) fn items_mut(&mut self) -> impl Iterator<Item = &mut Item<'a>> + '_ {
        self.sockets.iter_mut().filter_map(|x| x.as_mut())
    }
}

impl<'a> Default for SocketSet<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::tcp;

    fn tcp_socket() -> tcp::Socket<'static> {
        tcp::Socket::new(
            crate::storage::RingBuffer::new(vec![0u8; 64]),
            crate::storage::RingBuffer::new(vec![0u8; 64]),
        )
    }

    #[test]
    fn add_get_remove_roundtrip() {
        let mut set = SocketSet::new();
        let handle = set.add(tcp_socket());
        let _: &mut tcp::Socket = set.get_mut(handle);
        set.remove(handle);
        assert_eq!(set.items().count(), 0);
    }

    #[test]
    #[should_panic]
    fn full_pool_panics_on_add() {
        let mut set = SocketSet::new();
        loop {
            set.add(tcp_socket());
        }
    }
}
