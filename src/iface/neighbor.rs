use heapless::LinearMap;

use crate::config::IFACE_NEIGHBOR_CACHE_COUNT;
use crate::time::{Duration, Instant};
use crate::wire::{HardwareAddress, IpAddress};

/// Neighbor cache entries expire after this long without being refreshed.
const ENTRY_LIFETIME: Duration = Duration::from_secs(60);

/// After a failed resolution, further requests for the same address are
/// suppressed for this long, to avoid flooding the link with ARP/NDP
/// traffic for an address that keeps not answering.
const SILENT_TIME: Duration = Duration::from_secs(1);

/// The answer to a neighbor cache lookup.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Answer {
    /// The neighbor's hardware address is in the cache.
    Found(HardwareAddress),
    /// The neighbor is not in the cache, and a new resolution attempt should
    /// be started.
    NotFound,
    /// The neighbor is not in the cache, but resolution has already been
    /// attempted recently and should not be retried yet.
    RateLimited,
}

impl Answer {
    /// Whether the answer carries a usable hardware address.
    pub fn found(&self) -> bool {
        matches!(self, Answer::Found(_))
    }
}

/// A cached neighbor.
///
/// A neighbor mapping translates from a protocol address to a hardware
/// address, and contains the timestamp past which the mapping should be
/// discarded.
#[derive(Debug, Clone, Copy)]
struct Neighbor {
    hardware_addr: HardwareAddress,
    expires_at: Instant,
}

/// An ARP/NDP neighbor cache backed by a fixed-capacity map.
///
/// This is the collaborator the IP dispatcher consults before it can hand a
/// unicast frame to the link: it stores completed address resolutions and
/// rate-limits resolution attempts for addresses that are not answering.
#[derive(Debug)]
pub struct Cache {
    storage: LinearMap<IpAddress, Neighbor, IFACE_NEIGHBOR_CACHE_COUNT>,
    silent_until: Instant,
}

impl Cache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            storage: LinearMap::new(),
            silent_until: Instant::from_millis(0),
        }
    }

    /// Remove all entries, e.g. after the interface's IP addresses change.
    pub(crate) fn flush(&mut self) {
        self.storage.clear()
    }

    /// Record a (protocol address, hardware address) resolution.
    pub(crate) fn fill(
        &mut self,
        protocol_addr: IpAddress,
        hardware_addr: HardwareAddress,
        timestamp: Instant,
    ) {
        if protocol_addr.is_unspecified() {
            return;
        }

        let neighbor = Neighbor {
            hardware_addr,
            expires_at: timestamp + ENTRY_LIFETIME,
        };

        match self.storage.insert(protocol_addr, neighbor) {
            Ok(None) | Ok(Some(_)) => {}
            Err((_, _)) => {
                // Cache full: evict the entry that expires soonest to make
                // room, then retry the insert.
                if let Some((&oldest_addr, _)) = self
                    .storage
                    .iter()
                    .min_by_key(|(_, n)| n.expires_at)
                {
                    self.storage.remove(&oldest_addr);
                    let _ = self.storage.insert(protocol_addr, neighbor);
                }
            }
        }
    }

    /// Refresh the expiry of an already-cached entry, without creating a new
    /// one if the address isn't present. Called whenever a unicast packet
    /// arrives from a neighbor we already have resolved, so a busy peer's
    /// entry doesn't expire out from under an active conversation.
    pub(crate) fn reset_expiry_if_existing(
        &mut self,
        protocol_addr: IpAddress,
        hardware_addr: HardwareAddress,
        timestamp: Instant,
    ) {
        if let Some(neighbor) = self.storage.get_mut(&protocol_addr) {
            neighbor.hardware_addr = hardware_addr;
            neighbor.expires_at = timestamp + ENTRY_LIFETIME;
        }
    }

    /// Look up `protocol_addr`, expiring it first if its lifetime has
    /// passed.
    pub(crate) fn lookup(&mut self, protocol_addr: &IpAddress, timestamp: Instant) -> Answer {
        if let Some(neighbor) = self.storage.get(protocol_addr) {
            if neighbor.expires_at >= timestamp {
                return Answer::Found(neighbor.hardware_addr);
            }
            self.storage.remove(protocol_addr);
        }

        if timestamp < self.silent_until {
            Answer::RateLimited
        } else {
            Answer::NotFound
        }
    }

    /// Mark that a resolution attempt was just made, so further attempts
    /// are rate-limited until [`SILENT_TIME`] has passed.
    pub(crate) fn limit_rate(&mut self, timestamp: Instant) {
        self.silent_until = timestamp + SILENT_TIME;
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{EthernetAddress, Ipv4Address};

    fn addr() -> IpAddress {
        IpAddress::Ipv4(Ipv4Address::new(192, 168, 1, 1))
    }

    fn hwaddr() -> HardwareAddress {
        HardwareAddress::Ethernet(EthernetAddress::from_bytes(&[2, 0, 0, 0, 0, 1]))
    }

    #[test]
    fn fill_then_lookup_finds_entry() {
        let mut cache = Cache::new();
        let now = Instant::from_millis(0);
        cache.fill(addr(), hwaddr(), now);
        assert_eq!(cache.lookup(&addr(), now), Answer::Found(hwaddr()));
    }

    #[test]
    fn expired_entry_is_not_found() {
        let mut cache = Cache::new();
        let now = Instant::from_millis(0);
        cache.fill(addr(), hwaddr(), now);
        let later = now + ENTRY_LIFETIME + Duration::from_millis(1);
        assert_eq!(cache.lookup(&addr(), later), Answer::NotFound);
    }

    #[test]
    fn reset_expiry_refreshes_existing_entry_only() {
        let mut cache = Cache::new();
        let now = Instant::from_millis(0);
        cache.fill(addr(), hwaddr(), now);

        let later = now + ENTRY_LIFETIME - Duration::from_millis(1);
        cache.reset_expiry_if_existing(addr(), hwaddr(), later);
        let past_original_lifetime = now + ENTRY_LIFETIME + Duration::from_millis(1);
        assert_eq!(
            cache.lookup(&addr(), past_original_lifetime),
            Answer::Found(hwaddr())
        );

        let other = IpAddress::Ipv4(Ipv4Address::new(192, 168, 1, 2));
        cache.reset_expiry_if_existing(other, hwaddr(), now);
        assert_eq!(cache.lookup(&other, now), Answer::NotFound);
    }

    #[test]
    fn rate_limiting_after_failed_attempt() {
        let mut cache = Cache::new();
        let now = Instant::from_millis(0);
        assert_eq!(cache.lookup(&addr(), now), Answer::NotFound);
        cache.limit_rate(now);
        assert_eq!(cache.lookup(&addr(), now), Answer::RateLimited);
        let later = now + SILENT_TIME + Duration::from_millis(1);
        assert_eq!(cache.lookup(&addr(), later), Answer::NotFound);
    }
}
