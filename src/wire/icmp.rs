//! A protocol-agnostic wrapper over [`icmpv4::Repr`] and [`icmpv6::Repr`],
//! used where a caller (e.g. the raw-socket front end) needs to handle
//! either family without matching on [`IpVersion`] itself.

use core::fmt;

use crate::wire::{icmpv4, icmpv6};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Repr<'a> {
    Ipv4(icmpv4::Repr<'a>),
    Ipv6(icmpv6::Repr<'a>),
}

impl<'a> From<icmpv4::Repr<'a>> for Repr<'a> {
    fn from(s: icmpv4::Repr<'a>) -> Self {
        Repr::Ipv4(s)
    }
}

impl<'a> From<icmpv6::Repr<'a>> for Repr<'a> {
    fn from(s: icmpv6::Repr<'a>) -> Self {
        Repr::Ipv6(s)
    }
}

impl<'a> fmt::Display for Repr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Repr::Ipv4(repr) => write!(f, "{repr}"),
            Repr::Ipv6(repr) => write!(f, "{repr}"),
        }
    }
}
