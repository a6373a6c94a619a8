//! Interface to a DHCP client collaborator (spec §6: "push-notifies IP
//! address changes via a registered hook"). The DHCP wire protocol itself
//! is out of scope; this crate only re-homes bound sockets on lease change.

use crate::wire::IpCidr;

/// Called by an external DHCP client when a lease is acquired, renewed, or
/// released. `Core::set_dhcp_hook` registers the implementation that
/// re-homes sockets bound to the previous address.
pub trait Hook {
    /// A new (or renewed) lease replaced `old` with `new` on the given
    /// interface. `old` is `None` on first acquisition.
    fn on_lease(&mut self, old: Option<IpCidr>, new: IpCidr);
}

/// A no-op hook, useful for interfaces that are statically configured and
/// never run a DHCP client.
#[derive(Debug, Default)]
pub struct NullHook;

impl Hook for NullHook {
    fn on_lease(&mut self, _old: Option<IpCidr>, _new: IpCidr) {}
}
