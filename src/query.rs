//! The library's top-level API: build a query, fan it out across
//! matching interfaces, and stream back decoded responses until a
//! deadline or the caller stops listening.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use tokio_stream::{Stream, StreamExt};

use crate::cache::{CacheHandle, Family};
use crate::events::{enumerate, matches_prefixes, InterfaceAddress, InterfaceEvent};
use crate::interface::{spawn_worker, DecodedResponse, WorkerHandle};
use crate::settings::Settings;
use crate::wire::Question;

/// Which address families a query should fan out to.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FamilyFilter {
    Inet,
    Inet6,
    Any,
}

impl FamilyFilter {
    fn matches(self, family: Family) -> bool {
        match self {
            FamilyFilter::Any => true,
            FamilyFilter::Inet => family == Family::Inet,
            FamilyFilter::Inet6 => family == Family::Inet6,
        }
    }
}

/// Options controlling which interfaces a query runs on and how long
/// it waits for responses.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub family: FamilyFilter,
    pub ifname: Option<String>,
    pub ifindex: Option<u32>,
    pub timeout_ms: u64,
    pub interface_prefixes: Vec<String>,
}

impl QueryOptions {
    /// Build options from [`Settings`], with every field still
    /// individually overridable by the caller afterwards.
    pub fn from_settings(settings: &Settings) -> Self {
        QueryOptions {
            family: match settings.default_family {
                crate::settings::DefaultFamily::Inet => FamilyFilter::Inet,
                crate::settings::DefaultFamily::Inet6 => FamilyFilter::Inet6,
                crate::settings::DefaultFamily::Any => FamilyFilter::Any,
            },
            ifname: None,
            ifindex: None,
            timeout_ms: settings.default_timeout_ms,
            interface_prefixes: settings.interface_prefixes.clone(),
        }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            family: FamilyFilter::Any,
            ifname: None,
            ifindex: None,
            timeout_ms: 5000,
            interface_prefixes: Vec::new(),
        }
    }
}

/// Top-level API over the cache and interface workers.
pub struct QueryDriver {
    cache: CacheHandle,
}

impl QueryDriver {
    /// Build a driver over a freshly spawned cache actor with the
    /// given desired size.
    pub fn new(cache_size: usize) -> Self {
        QueryDriver {
            cache: crate::cache::spawn(cache_size),
        }
    }

    /// Build a driver over an existing cache handle, for example one
    /// shared with a passive listener set up independently.
    pub fn with_cache(cache: CacheHandle) -> Self {
        QueryDriver { cache }
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    /// Start an always-on passive listener on every interface matching
    /// `opts` (ignoring `opts.timeout_ms`, which only bounds an active
    /// [`QueryDriver::stream`] query): each listener joins the mDNS
    /// group on its interface and feeds unsolicited announcements into
    /// the cache without ever sending a query itself. Callers keep the
    /// returned handles alive for as long as passive listening should
    /// continue, and stop them individually when done.
    pub async fn spawn_passive_listeners(&self, opts: &QueryOptions) -> Vec<WorkerHandle> {
        let mut handles = Vec::new();
        for iface in select_interfaces(opts) {
            match crate::interface::spawn_passive_listener(iface.clone(), self.cache.clone()).await {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    warn!(ifname = %iface.ifname, error = %err, "failed to start passive listener");
                }
            }
        }
        handles
    }

    /// Enumerate interfaces matching `opts`, spawn a worker per
    /// matching `(interface, family)`, and stream back every decoded
    /// response until `opts.timeout_ms` elapses or the returned
    /// stream is dropped.
    pub async fn stream(
        &self,
        questions: Vec<Question>,
        opts: QueryOptions,
    ) -> ReceiverStream<DecodedResponse> {
        let (tx, rx) = mpsc::channel(256);
        let cache = self.cache.clone();

        tokio::spawn(async move {
            let interfaces = select_interfaces(&opts);
            let mut workers: Vec<WorkerHandle> = Vec::with_capacity(interfaces.len());

            for iface in interfaces {
                match spawn_worker(iface.clone(), questions.clone(), cache.clone(), tx.clone()).await {
                    Ok(handle) => workers.push(handle),
                    Err(err) => {
                        warn!(ifname = %iface.ifname, error = %err, "failed to start interface worker");
                    }
                }
            }

            info!(workers = workers.len(), timeout_ms = opts.timeout_ms, "query started");
            sleep(Duration::from_millis(opts.timeout_ms)).await;

            for worker in workers {
                worker.stop().await;
            }
            // tx is dropped here, closing the stream for the consumer.
        });

        ReceiverStream::new(rx)
    }

    /// React to an inbound stream of [`InterfaceEvent`]s by withdrawing
    /// affected `(family, ifindex)` scopes from the cache on
    /// `link_down`/`del_addr`, per the interface withdrawal rule. The
    /// producer of `events` (netlink, `SCNetworkReachability`, or
    /// similar) is out of scope for this crate; callers supply it.
    pub fn watch_events<S>(&self, events: S) -> JoinHandle<()>
    where
        S: Stream<Item = InterfaceEvent> + Send + 'static,
    {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            tokio::pin!(events);
            let mut known = known_interface_scopes();
            while let Some(event) = events.next().await {
                match &event {
                    InterfaceEvent::LinkUp { ifname } | InterfaceEvent::NewAddr { ifname, .. } => {
                        if let Some(scopes) = lookup_scopes(ifname) {
                            known.insert(ifname.clone(), scopes);
                        }
                    }
                    InterfaceEvent::LinkDown { ifname } => {
                        if let Some(scopes) = known.remove(ifname) {
                            for (family, ifindex) in scopes {
                                debug!(ifname, ?family, ifindex, "interface down, withdrawing from cache");
                                cache.withdraw_interface(family, ifindex).await;
                            }
                        }
                    }
                    InterfaceEvent::DelAddr { ifname, address } => {
                        let family = family_of(*address);
                        let ifindex = known
                            .get(ifname)
                            .and_then(|scopes| scopes.iter().find(|(f, _)| *f == family).map(|(_, i)| *i));
                        if let Some(ifindex) = ifindex {
                            debug!(ifname, ?family, ifindex, "address removed, withdrawing from cache");
                            cache.withdraw_interface(family, ifindex).await;
                            if let Some(scopes) = known.get_mut(ifname) {
                                scopes.retain(|(f, _)| *f != family);
                            }
                        }
                    }
                }
            }
        })
    }
}

fn family_of(address: IpAddr) -> Family {
    match address {
        IpAddr::V4(_) => Family::Inet,
        IpAddr::V6(_) => Family::Inet6,
    }
}

/// Build the initial `ifname -> [(family, ifindex)]` map the event
/// watcher needs, since the event stream only reports *changes* and
/// never establishes starting state on its own.
fn known_interface_scopes() -> HashMap<String, Vec<(Family, u32)>> {
    let mut map: HashMap<String, Vec<(Family, u32)>> = HashMap::new();
    if let Ok(addrs) = enumerate() {
        for addr in addrs {
            map.entry(addr.ifname).or_default().push((addr.family, addr.ifindex));
        }
    }
    map
}

fn lookup_scopes(ifname: &str) -> Option<Vec<(Family, u32)>> {
    let scopes: Vec<(Family, u32)> = enumerate()
        .ok()?
        .into_iter()
        .filter(|a| a.ifname == ifname)
        .map(|a| (a.family, a.ifindex))
        .collect();
    if scopes.is_empty() {
        None
    } else {
        Some(scopes)
    }
}

fn select_interfaces(opts: &QueryOptions) -> Vec<InterfaceAddress> {
    let all = match enumerate() {
        Ok(addrs) => addrs,
        Err(err) => {
            warn!(error = %err, "failed to enumerate interfaces");
            return Vec::new();
        }
    };

    all.into_iter()
        .filter(|iface| opts.family.matches(iface.family))
        .filter(|iface| opts.ifname.as_deref().map_or(true, |want| want == iface.ifname))
        .filter(|iface| opts.ifindex.map_or(true, |want| want == iface.ifindex))
        .filter(|iface| matches_prefixes(&iface.ifname, &opts.interface_prefixes))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_filter_any_matches_both() {
        assert!(FamilyFilter::Any.matches(Family::Inet));
        assert!(FamilyFilter::Any.matches(Family::Inet6));
    }

    #[test]
    fn family_filter_inet_excludes_inet6() {
        assert!(FamilyFilter::Inet.matches(Family::Inet));
        assert!(!FamilyFilter::Inet.matches(Family::Inet6));
    }

    #[test]
    fn options_from_settings_carries_defaults_through() {
        let settings = Settings::default();
        let opts = QueryOptions::from_settings(&settings);
        assert_eq!(opts.timeout_ms, settings.default_timeout_ms);
        assert_eq!(opts.family, FamilyFilter::Any);
        assert!(opts.ifname.is_none());
        assert!(opts.ifindex.is_none());
    }

    #[test]
    fn family_of_maps_by_ip_version() {
        assert_eq!(family_of("10.0.0.1".parse().unwrap()), Family::Inet);
        assert_eq!(family_of("::1".parse().unwrap()), Family::Inet6);
    }

    #[tokio::test]
    async fn watch_events_ignores_events_for_unknown_interfaces() {
        let driver = QueryDriver::new(64);
        let events = tokio_stream::iter(vec![
            InterfaceEvent::LinkDown {
                ifname: "nonexistent0".to_string(),
            },
            InterfaceEvent::DelAddr {
                ifname: "nonexistent0".to_string(),
                address: "10.0.0.1".parse().unwrap(),
            },
        ]);
        // Should drain without panicking even though the interface was
        // never seen by `enumerate()`.
        driver.watch_events(events).await.unwrap();
    }
}
