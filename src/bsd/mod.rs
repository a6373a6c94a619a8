//! BSD-style socket API (spec §4.5) layered over the sans-I/O transport
//! engines in [`crate::socket`] and the network core thread in
//! [`crate::iface`].
//!
//! `core` is the entry point applications use; the other submodules are
//! its supporting types, split out the way the teacher splits `net/`,
//! `misc/`, and `parsers.rs` into one concern per file.

pub mod core;
pub mod dhcp;
pub mod dns;
pub mod errno;
pub mod event;
pub mod fd;
pub mod select;
pub mod sockopt;
pub mod tls;

pub use self::core::{Core, CoreHandle};
pub use self::errno::Errno;
pub use self::event::{TcpEvent, UdpEvent};
pub use self::fd::{Family, SockType};
pub use self::select::FdSet;
pub use self::sockopt::{OptValue, SockOpt};
