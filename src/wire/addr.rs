//! Byte-order helpers and address text conversions.
//!
//! Grounded on the `htons`/`htonl`/`gethostbyname` surface exposed by
//! `rl_net.h` (§ BSD socket helpers); `inet_pton`/`inet_ntop` follow the
//! usual POSIX semantics for dotted-quad and colon-hex notation.

use core::fmt::Write as _;

use super::{Error, IpAddress, Ipv4Address, Ipv6Address, Result};

/// Host to network byte order, 16-bit.
pub const fn htons(v: u16) -> u16 {
    v.to_be()
}

/// Host to network byte order, 32-bit.
pub const fn htonl(v: u32) -> u32 {
    v.to_be()
}

/// Network to host byte order, 16-bit.
pub const fn ntohs(v: u16) -> u16 {
    u16::from_be(v)
}

/// Network to host byte order, 32-bit.
pub const fn ntohl(v: u32) -> u32 {
    u32::from_be(v)
}

/// Parse a dotted-quad IPv4 address or a colon-hex IPv6 address.
pub fn inet_pton(text: &str) -> Result<IpAddress> {
    if let Ok(addr) = text.parse::<Ipv4Address>() {
        return Ok(IpAddress::Ipv4(addr));
    }
    if let Ok(addr) = text.parse::<Ipv6Address>() {
        return Ok(IpAddress::Ipv6(addr));
    }
    Err(Error)
}

/// Format an address in its family's canonical text notation.
pub fn inet_ntop(addr: IpAddress) -> heapless::String<64> {
    let mut s = heapless::String::new();
    let _ = write!(s, "{addr}");
    s
}

/// A single A/AAAA resolution result, as would be returned by a `gethostbyname()`
/// style lookup.
pub trait HostResolver {
    /// Resolve `name` to one address, or `Err` if not found. A real client
    /// (`bsd::dns`) implements this against a live DNS exchange; tests and
    /// the loopback demo use [`StaticResolver`].
    fn gethostbyname(&self, name: &str) -> Result<IpAddress>;
}

/// A resolver backed by a fixed host table, useful for tests and for
/// embedded builds with no DNS client wired up.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    entries: heapless::Vec<(heapless::String<64>, IpAddress), 8>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, addr: IpAddress) -> core::result::Result<(), ()> {
        let mut key = heapless::String::new();
        key.push_str(name).map_err(|_| ())?;
        self.entries.push((key, addr)).map_err(|_| ())
    }
}

impl HostResolver for StaticResolver {
    fn gethostbyname(&self, name: &str) -> Result<IpAddress> {
        self.entries
            .iter()
            .find(|(key, _)| key.as_str() == name)
            .map(|(_, addr)| *addr)
            .ok_or(Error)
    }
}

/// Resolve `name` against `resolver`, mirroring the shape of the C
/// `gethostbyname()` call without its `HOSTENT` output parameter.
pub fn gethostbyname<R: HostResolver>(resolver: &R, name: &str) -> Result<IpAddress> {
    resolver.gethostbyname(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_order_round_trips() {
        assert_eq!(ntohs(htons(0x1234)), 0x1234);
        assert_eq!(ntohl(htonl(0xdead_beef)), 0xdead_beef);
    }

    #[test]
    fn parses_both_families() {
        assert_eq!(
            inet_pton("192.168.1.1").unwrap(),
            IpAddress::Ipv4(Ipv4Address::new(192, 168, 1, 1))
        );
        assert!(inet_pton("::1").is_ok());
        assert!(inet_pton("not-an-address").is_err());
    }

    #[test]
    fn static_resolver_round_trips() {
        let mut resolver = StaticResolver::new();
        resolver
            .insert("localhost", IpAddress::Ipv4(Ipv4Address::new(127, 0, 0, 1)))
            .unwrap();
        assert_eq!(
            gethostbyname(&resolver, "localhost").unwrap(),
            IpAddress::Ipv4(Ipv4Address::new(127, 0, 0, 1))
        );
        assert!(gethostbyname(&resolver, "missing").is_err());
    }
}
