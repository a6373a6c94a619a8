//! The BSD file-descriptor table: one entry per open socket, mapping a
//! small positive integer to the transport control block underneath it.
//!
//! Grounded on the allocate/close/get shape of a kernel FD table (see
//! `fd_table.rs` in the pack's AnyOS kernel), adapted to a fixed-capacity
//! `heapless::Vec` instead of a raw array, and to the transport handles
//! this crate actually has (`iface::SocketHandle`) instead of raw kinds.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration as StdDuration;

use heapless::Vec;

use crate::config::FD_TABLE_SIZE;
use crate::iface::SocketHandle;

/// A 32-bit interface identity: class (high byte) + instance index, per
/// the data model's "Interface identity" entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub u32);

/// Socket address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Inet,
    Inet6,
}

/// Socket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockType {
    Stream,
    Dgram,
}

/// Which transport control block an FD entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHandle {
    Tcp(SocketHandle),
    Udp(SocketHandle),
}

/// A per-FD condition variable the core thread signals when that FD's
/// blocking predicate (readable/writable/error) may have changed.
///
/// One `Waiter` per FD entry; `accept`/`connect`/`recv`/`send`/`select`
/// all wait on it rather than busy-polling.
#[derive(Debug, Default)]
pub struct Waiter {
    woken: Mutex<bool>,
    condvar: Condvar,
}

impl Waiter {
    pub fn new() -> Self {
        Waiter {
            woken: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Wake any thread blocked in [`Waiter::wait`].
    pub fn notify(&self) {
        let mut woken = self.woken.lock().unwrap();
        *woken = true;
        self.condvar.notify_all();
    }

    /// Block until [`Waiter::notify`] is called or `timeout` elapses.
    /// Returns `true` if woken, `false` on timeout.
    pub fn wait(&self, timeout: Option<StdDuration>) -> bool {
        let mut woken = self.woken.lock().unwrap();
        while !*woken {
            woken = match timeout {
                None => self.condvar.wait(woken).unwrap(),
                Some(d) => {
                    let (guard, result) = self.condvar.wait_timeout(woken, d).unwrap();
                    if result.timed_out() {
                        return false;
                    }
                    guard
                }
            };
        }
        *woken = false;
        true
    }
}

/// One entry in the FD table: {family, type, underlying CB reference,
/// flags, timeouts, bind-to-device, per-FD wait object}.
#[derive(Debug)]
pub struct FdEntry {
    pub family: Family,
    pub ty: SockType,
    pub handle: TransportHandle,
    pub non_blocking: bool,
    pub rcvtimeo: Option<StdDuration>,
    pub sndtimeo: Option<StdDuration>,
    pub bind_device: Option<InterfaceId>,
    /// Set once a terminal protocol error has been observed; surfaced to
    /// the next user-API call on this FD and sticky until close (spec
    /// §7 "Terminal errors").
    pub error: Option<crate::bsd::errno::Errno>,
    /// Shared (not owned) so a caller can clone it out and wait without
    /// holding the table lock the whole time.
    pub waiter: Arc<Waiter>,
}

impl FdEntry {
    fn new(family: Family, ty: SockType, handle: TransportHandle) -> Self {
        FdEntry {
            family,
            ty,
            handle,
            non_blocking: false,
            rcvtimeo: None,
            sndtimeo: None,
            bind_device: None,
            error: None,
            waiter: Arc::new(Waiter::new()),
        }
    }
}

/// The fixed-capacity FD table. FD `0` is never valid; slot `i` backs FD
/// `i + 1`.
#[derive(Debug)]
pub struct FdTable {
    entries: Vec<Option<FdEntry>, FD_TABLE_SIZE>,
}

impl FdTable {
    pub fn new() -> Self {
        let mut entries = Vec::new();
        for _ in 0..FD_TABLE_SIZE {
            let _ = entries.push(None);
        }
        FdTable { entries }
    }

    /// Allocate the lowest free FD for the given transport handle.
    pub fn alloc(&mut self, family: Family, ty: SockType, handle: TransportHandle) -> Option<i32> {
        let slot = self.entries.iter().position(|e| e.is_none())?;
        self.entries[slot] = Some(FdEntry::new(family, ty, handle));
        Some(slot as i32 + 1)
    }

    fn slot(fd: i32) -> Option<usize> {
        if fd <= 0 {
            return None;
        }
        Some(fd as usize - 1)
    }

    pub fn get(&self, fd: i32) -> Option<&FdEntry> {
        self.entries.get(Self::slot(fd)?)?.as_ref()
    }

    pub fn get_mut(&mut self, fd: i32) -> Option<&mut FdEntry> {
        self.entries.get_mut(Self::slot(fd)?)?.as_mut()
    }

    /// Remove and return the FD's entry, e.g. for transport teardown.
    pub fn close(&mut self, fd: i32) -> Option<FdEntry> {
        let slot = Self::slot(fd)?;
        self.entries.get_mut(slot)?.take()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &FdEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i as i32 + 1, e)))
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::SocketSet;
    use crate::socket::udp;
    use crate::storage::PacketMetadata;

    fn some_handle(sockets: &mut SocketSet<'static>) -> SocketHandle {
        sockets.add(udp::Socket::new(
            udp::PacketBuffer::new(vec![PacketMetadata::EMPTY; 1], vec![0u8; 16]),
            udp::PacketBuffer::new(vec![PacketMetadata::EMPTY; 1], vec![0u8; 16]),
        ))
    }

    #[test]
    fn fd_zero_is_never_returned() {
        let mut sockets = SocketSet::new();
        let handle = some_handle(&mut sockets);
        let mut table = FdTable::new();
        let fd = table
            .alloc(Family::Inet, SockType::Dgram, TransportHandle::Udp(handle))
            .unwrap();
        assert!(fd > 0);
    }

    #[test]
    fn close_frees_the_slot_for_reuse() {
        let mut sockets = SocketSet::new();
        let handle = some_handle(&mut sockets);
        let mut table = FdTable::new();
        let fd = table
            .alloc(Family::Inet, SockType::Dgram, TransportHandle::Udp(handle))
            .unwrap();
        assert!(table.close(fd).is_some());
        assert!(table.get(fd).is_none());
        let fd2 = table
            .alloc(Family::Inet, SockType::Dgram, TransportHandle::Udp(handle))
            .unwrap();
        assert_eq!(fd, fd2);
    }

    #[test]
    fn pool_exhaustion_returns_none() {
        let mut sockets = SocketSet::new();
        let handle = some_handle(&mut sockets);
        let mut table = FdTable::new();
        for _ in 0..FD_TABLE_SIZE {
            table
                .alloc(Family::Inet, SockType::Dgram, TransportHandle::Udp(handle))
                .unwrap();
        }
        assert!(table
            .alloc(Family::Inet, SockType::Dgram, TransportHandle::Udp(handle))
            .is_none());
    }
}
