//! LAN discovery: UDP multicast beacons, endpoint table with timeout-based loss.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use nonet_core::{decode_frame, EndpointId, LinkMessage, PROTOCOL_VERSION};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::transport::LinkContext;

const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 70, 70);
const BEACON_INTERVAL: Duration = Duration::from_secs(2);
const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(8);
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct Sighting {
    name: String,
    addr: SocketAddr,
    last_seen: Instant,
}

/// What a beacon changed in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    New,
    Renamed,
    Refreshed,
}

/// Endpoints heard from recently under one service id.
pub struct EndpointTable {
    local_id: EndpointId,
    service_id: String,
    seen: HashMap<EndpointId, Sighting>,
}

impl EndpointTable {
    pub fn new(local_id: EndpointId, service_id: &str) -> Self {
        Self {
            local_id,
            service_id: service_id.to_owned(),
            seen: HashMap::new(),
        }
    }

    /// Record a beacon received from `from`. Ignores our own beacons, other services and
    /// other protocol versions.
    pub fn on_beacon(
        &mut self,
        msg: &LinkMessage,
        from: SocketAddr,
        now: Instant,
    ) -> Option<(EndpointId, Seen)> {
        let LinkMessage::Beacon {
            protocol_version,
            service_id,
            endpoint_id,
            name,
            listen_port,
        } = msg
        else {
            return None;
        };
        if *protocol_version != PROTOCOL_VERSION
            || *service_id != self.service_id
            || *endpoint_id == self.local_id
        {
            return None;
        }
        let addr = SocketAddr::new(from.ip(), *listen_port);
        let seen = match self.seen.get_mut(endpoint_id) {
            Some(s) => {
                s.addr = addr;
                s.last_seen = now;
                if s.name == *name {
                    Seen::Refreshed
                } else {
                    s.name = name.clone();
                    Seen::Renamed
                }
            }
            None => {
                self.seen.insert(
                    endpoint_id.clone(),
                    Sighting {
                        name: name.clone(),
                        addr,
                        last_seen: now,
                    },
                );
                Seen::New
            }
        };
        Some((endpoint_id.clone(), seen))
    }

    /// Remove and return endpoints not heard from within the timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<EndpointId> {
        let stale: Vec<EndpointId> = self
            .seen
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_seen) >= ENDPOINT_TIMEOUT)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.seen.remove(id);
        }
        stale
    }

    pub fn get(&self, id: &EndpointId) -> Option<(&str, SocketAddr)> {
        self.seen.get(id).map(|s| (s.name.as_str(), s.addr))
    }
}

/// Receiving socket joined to the discovery group. Several processes on one host may share
/// the port.
pub fn multicast_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    socket.join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_loop_v4(true)?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

/// Sending socket for beacons; link-local only.
pub fn beacon_socket() -> std::io::Result<UdpSocket> {
    let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_multicast_ttl_v4(1)?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket)
}

pub async fn beacon_loop(socket: UdpSocket, frame: Vec<u8>, discovery_port: u16) {
    let dest = SocketAddr::from((MULTICAST_GROUP, discovery_port));
    let mut tick = tokio::time::interval(BEACON_INTERVAL);
    loop {
        tick.tick().await;
        if let Err(e) = socket.send_to(&frame, dest).await {
            debug!(error = %e, "beacon send failed");
        }
    }
}

pub(crate) async fn run_discovery(socket: UdpSocket, mut table: EndpointTable, link: LinkContext) {
    let mut buf = vec![0u8; 65536];
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            res = socket.recv_from(&mut buf) => {
                let (n, from) = match res {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "discovery socket failed");
                        return;
                    }
                };
                let Ok((msg, _)) = decode_frame(&buf[..n]) else {
                    debug!(%from, "undecodable datagram ignored");
                    continue;
                };
                if let Some((id, seen)) = table.on_beacon(&msg, from, Instant::now()) {
                    if let Some((name, addr)) = table.get(&id) {
                        link.endpoint_seen(&id, name, addr, seen != Seen::Refreshed);
                    }
                }
            }
            _ = sweep.tick() => {
                for id in table.expire(Instant::now()) {
                    debug!(endpoint = %id, "endpoint timed out");
                    link.endpoint_lost(&id);
                }
            }
        }
    }
}
