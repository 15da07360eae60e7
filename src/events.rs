//! The interface-change event shape this crate reacts to.
//!
//! A full netlink/platform event producer is out of scope for this
//! crate (see the purpose-and-scope notes): callers wire up their own
//! source of [`InterfaceEvent`] values (for example, backed by
//! `rtnetlink` on Linux or `SCNetworkReachability` on macOS) and feed
//! it to [`crate::query::QueryDriver::watch_events`]. What this module
//! owns is the event type itself, and a one-shot enumeration of
//! current interface addresses used when a query starts.

use std::net::IpAddr;

use crate::cache::Family;

/// A single interface-change notification.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InterfaceEvent {
    LinkUp { ifname: String },
    LinkDown { ifname: String },
    NewAddr { ifname: String, address: IpAddr },
    DelAddr { ifname: String, address: IpAddr },
}

/// One address on one interface, as returned by [`enumerate`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InterfaceAddress {
    pub ifname: String,
    pub ifindex: u32,
    pub family: Family,
    pub address: IpAddr,
}

/// Enumerate the host's current interface addresses, for use as the
/// starting point of a query (the event stream only reports
/// *changes*, so something has to establish the initial state).
///
/// Loopback interfaces are excluded: mDNS has no use for them, and the
/// teacher's own net-facing code never binds to loopback for
/// multicast.
pub fn enumerate() -> std::io::Result<Vec<InterfaceAddress>> {
    let ifaces = if_addrs::get_if_addrs()?;
    Ok(ifaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| {
            let address = iface.ip();
            let family = match address {
                IpAddr::V4(_) => Family::Inet,
                IpAddr::V6(_) => Family::Inet6,
            };
            Some(InterfaceAddress {
                ifname: iface.name.clone(),
                ifindex: iface.index.unwrap_or(0),
                family,
                address,
            })
        })
        .collect())
}

/// Interface-name prefix filtering, as configured by
/// [`crate::settings::Settings::interface_prefixes`].
pub fn matches_prefixes(ifname: &str, prefixes: &[String]) -> bool {
    prefixes.is_empty() || prefixes.iter().any(|p| ifname.starts_with(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prefix_list_matches_everything() {
        assert!(matches_prefixes("eth0", &[]));
    }

    #[test]
    fn prefix_list_restricts_to_matching_interfaces() {
        let prefixes = vec!["en".to_string()];
        assert!(matches_prefixes("en0", &prefixes));
        assert!(!matches_prefixes("eth0", &prefixes));
    }
}
