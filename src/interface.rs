//! Per-`(interface, family)` socket workers: the part of this crate
//! that actually touches the network.
//!
//! An [`InterfaceWorker`] binds a multicast UDP socket, sends one
//! query seeded with known answers, and then loops receiving
//! datagrams, handing each to the [`crate::cache::CacheHandle`] and
//! forwarding the decoded message to the caller. A passive listener
//! (spawned with [`spawn_passive_listener`]) runs the same receive
//! loop without ever sending, to pick up unsolicited announcements.
//!
//! Socket setup follows the mDNS conventions in RFC 6762 section 11:
//! multicast loopback disabled, TTL/hops 255, `SO_REUSEADDR`/
//! `SO_REUSEPORT` so multiple workers can share the port across
//! interfaces.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheHandle, Family};
use crate::error::{SocketError, SocketOp};
use crate::events::InterfaceAddress;
use crate::wire::{Message, Question, ResourceRecord};

/// The mDNS multicast port, per RFC 6762 section 3.
const MDNS_PORT: u16 = 5353;

fn mdns_group_v4() -> Ipv4Addr {
    Ipv4Addr::new(224, 0, 0, 251)
}

fn mdns_group_v6() -> Ipv6Addr {
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb)
}

/// A message decoded from a datagram, tagged with where it arrived.
#[derive(Debug, Clone)]
pub struct DecodedResponse {
    pub family: Family,
    pub ifindex: u32,
    pub message: Message,
}

/// A handle used to stop a running worker or passive listener.
pub struct WorkerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop and wait for it to finish closing its
    /// socket.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

fn socket_err(op: SocketOp, iface: &InterfaceAddress, source: io::Error) -> SocketError {
    SocketError {
        op,
        ifname: iface.ifname.clone(),
        address: Some(iface.address),
        source,
    }
}

/// Open, configure, join the multicast group on, and bind a UDP
/// socket for `iface`, per RFC 6762 section 11. `bind_port` is
/// `MDNS_PORT` for the passive listener and `0` (ephemeral) for an
/// active query worker, per section 4.7 step 3.
fn open_group_socket(iface: &InterfaceAddress, bind_port: u16) -> Result<std::net::UdpSocket, SocketError> {
    let domain = match iface.family {
        Family::Inet => Domain::IPV4,
        Family::Inet6 => Domain::IPV6,
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| socket_err(SocketOp::Bind, iface, e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| socket_err(SocketOp::SetOpt, iface, e))?;
    #[cfg(unix)]
    socket
        .set_reuse_port(true)
        .map_err(|e| socket_err(SocketOp::SetOpt, iface, e))?;

    match iface.family {
        Family::Inet => {
            socket
                .set_multicast_loop_v4(false)
                .map_err(|e| socket_err(SocketOp::SetOpt, iface, e))?;
            socket
                .set_multicast_ttl_v4(255)
                .map_err(|e| socket_err(SocketOp::SetOpt, iface, e))?;
            if let IpAddr::V4(local) = iface.address {
                socket
                    .set_multicast_if_v4(&local)
                    .map_err(|e| socket_err(SocketOp::SetOpt, iface, e))?;
            }
        }
        Family::Inet6 => {
            socket
                .set_multicast_loop_v6(false)
                .map_err(|e| socket_err(SocketOp::SetOpt, iface, e))?;
            socket
                .set_multicast_hops_v6(255)
                .map_err(|e| socket_err(SocketOp::SetOpt, iface, e))?;
            socket
                .set_multicast_if_v6(iface.ifindex)
                .map_err(|e| socket_err(SocketOp::SetOpt, iface, e))?;
        }
    }

    enable_pktinfo(&socket, iface.family);

    join_group(&socket, iface).map_err(|e| socket_err(SocketOp::JoinMulticast, iface, e))?;

    let bind_addr: SocketAddr = match iface.address {
        IpAddr::V4(v4) => SocketAddr::V4(SocketAddrV4::new(v4, bind_port)),
        IpAddr::V6(v6) => SocketAddr::V6(SocketAddrV6::new(v6, bind_port, 0, iface.ifindex)),
    };
    socket
        .bind(&bind_addr.into())
        .map_err(|e| socket_err(SocketOp::Bind, iface, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| socket_err(SocketOp::SetOpt, iface, e))?;

    Ok(socket.into())
}

fn join_group(socket: &Socket, iface: &InterfaceAddress) -> io::Result<()> {
    match iface.family {
        Family::Inet => {
            let IpAddr::V4(local) = iface.address else {
                return Ok(());
            };
            socket.join_multicast_v4(&mdns_group_v4(), &local)
        }
        Family::Inet6 => socket.join_multicast_v6(&mdns_group_v6(), iface.ifindex),
    }
}

/// Enable `IP_PKTINFO`/`IPV6_RECVPKTINFO`, per RFC 6762's requirement
/// to learn the receiving interface. Every socket this crate opens is
/// already scoped to a single interface at bind time, so the option is
/// set for wire-level parity with other mDNS implementations rather
/// than relied on to tag incoming datagrams; failure to set it is
/// logged but not fatal.
fn enable_pktinfo(socket: &Socket, family: Family) {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;

        let fd = socket.as_raw_fd();
        let one: libc::c_int = 1;
        let (level, optname) = match family {
            Family::Inet => (libc::IPPROTO_IP, libc::IP_PKTINFO),
            Family::Inet6 => (libc::IPPROTO_IPV6, libc::IPV6_RECVPKTINFO),
        };
        let ret = unsafe {
            libc::setsockopt(
                fd,
                level,
                optname,
                &one as *const _ as *const libc::c_void,
                std::mem::size_of_val(&one) as libc::socklen_t,
            )
        };
        if ret != 0 {
            warn!(error = %io::Error::last_os_error(), "failed to enable packet-info ancillary data");
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (socket, family);
    }
}

async fn send_to_group(socket: &UdpSocket, iface: &InterfaceAddress, bytes: &[u8]) -> io::Result<()> {
    let target: SocketAddr = match iface.family {
        Family::Inet => SocketAddr::V4(SocketAddrV4::new(mdns_group_v4(), MDNS_PORT)),
        Family::Inet6 => SocketAddr::V6(SocketAddrV6::new(mdns_group_v6(), MDNS_PORT, 0, iface.ifindex)),
    };
    socket.send_to(bytes, target).await?;
    Ok(())
}

fn build_query(id: u16, questions: Vec<Question>, known_answers: Vec<ResourceRecord>) -> Message {
    let mut message = Message::empty(id);
    message.questions = questions;
    message.answers = known_answers;
    message
}

async fn handle_datagram(
    bytes: &[u8],
    family: Family,
    ifindex: u32,
    cache: &CacheHandle,
    forward: Option<&mpsc::Sender<DecodedResponse>>,
) {
    match Message::decode(bytes) {
        Ok((message, _trailing)) => {
            cache.ingest(message.clone(), family, ifindex).await;
            if let Some(forward) = forward {
                let _ = forward.send(DecodedResponse { family, ifindex, message }).await;
            }
        }
        Err(err) => {
            debug!(?err, family = ?family, ifindex, "dropped malformed mdns datagram");
        }
    }
}

fn recv_loop(
    udp: UdpSocket,
    iface: InterfaceAddress,
    cache: CacheHandle,
    forward: Option<mpsc::Sender<DecodedResponse>>,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; 65535];
        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                result = udp.recv_from(&mut buf) => {
                    match result {
                        Ok((len, _src)) => {
                            handle_datagram(&buf[..len], iface.family, iface.ifindex, &cache, forward.as_ref()).await;
                        }
                        Err(err) => {
                            warn!(ifname = %iface.ifname, error = %err, "interface worker recv failed");
                        }
                    }
                }
            }
        }
        debug!(ifname = %iface.ifname, "interface worker stopped");
    })
}

/// Start a worker for `iface`: send one query seeded with known
/// answers from `cache`, then forward every decoded response on
/// `forward` until stopped. Binds to an ephemeral port, per RFC 6762
/// section 5.1 (the mDNS port itself is reserved for the passive
/// listener).
pub async fn spawn_worker(
    iface: InterfaceAddress,
    questions: Vec<Question>,
    cache: CacheHandle,
    forward: mpsc::Sender<DecodedResponse>,
) -> Result<WorkerHandle, SocketError> {
    let std_socket = open_group_socket(&iface, 0)?;
    let udp = UdpSocket::from_std(std_socket).map_err(|e| socket_err(SocketOp::Bind, &iface, e))?;

    let known_answers = cache.lookup(questions.clone(), iface.family, iface.ifindex).await;
    let query_id: u16 = rand::thread_rng().gen();
    let message = build_query(query_id, questions, known_answers);
    let bytes = message.encode();
    send_to_group(&udp, &iface, &bytes)
        .await
        .map_err(|e| socket_err(SocketOp::Send, &iface, e))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let task = recv_loop(udp, iface, cache, Some(forward), stop_rx);

    Ok(WorkerHandle { stop: stop_tx, task })
}

/// Start an always-on passive listener for `(family, ifindex)`: joins
/// the multicast group and feeds the cache from unsolicited traffic,
/// without sending anything or forwarding to a caller.
pub async fn spawn_passive_listener(
    iface: InterfaceAddress,
    cache: CacheHandle,
) -> Result<WorkerHandle, SocketError> {
    let std_socket = open_group_socket(&iface, MDNS_PORT)?;
    let udp = UdpSocket::from_std(std_socket).map_err(|e| socket_err(SocketOp::Bind, &iface, e))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let task = recv_loop(udp, iface, cache, None, stop_rx);

    Ok(WorkerHandle { stop: stop_tx, task })
}
