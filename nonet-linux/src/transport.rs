//! LAN transport: multicast beacons for discovery, one TCP link per connection.
//!
//! Primitive calls only touch the shared table and queue frames; every outcome is pushed
//! back into the event loop as a [`TransportEvent`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nonet_core::wire::{self, HEADER_LEN};
use nonet_core::{
    encode_frame, status, EndpointId, FrameError, Input, LinkMessage, PROTOCOL_VERSION,
    TransferProgress, Transport, TransportError, TransportEvent,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery::{self, EndpointTable};
use crate::event_loop::Command;

/// Time an inbound socket gets to send its `ConnectionRequest`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

struct Peer {
    addr: SocketAddr,
    name: String,
}

struct Link {
    /// Distinguishes this socket from an earlier or replaced one to the same endpoint.
    serial: u64,
    tx: mpsc::UnboundedSender<LinkMessage>,
    /// Resolves once the writer has flushed and shut the socket down.
    done: oneshot::Receiver<()>,
    outbound: bool,
    announced: bool,
    local: Option<bool>,
    remote: Option<bool>,
    established: bool,
    /// The socket went away before the session decided.
    closed: bool,
}

/// The socket-side ends of a [`Link`], owned by its writer task.
struct LinkIo {
    rx: mpsc::UnboundedReceiver<LinkMessage>,
    done: oneshot::Sender<()>,
}

impl Link {
    fn open(serial: u64, outbound: bool) -> (Self, LinkIo) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done) = oneshot::channel();
        let link = Self {
            serial,
            tx,
            done,
            outbound,
            announced: !outbound,
            local: None,
            remote: None,
            established: false,
            closed: false,
        };
        (link, LinkIo { rx, done: done_tx })
    }
}

#[derive(Default)]
struct Shared {
    peers: HashMap<EndpointId, Peer>,
    links: HashMap<EndpointId, Link>,
    /// Writers of locally closed links still draining.
    closing: Vec<oneshot::Receiver<()>>,
}

impl Shared {
    /// Resolve the handshake. Nothing resolves before the local decision, so the session
    /// always hears the outcome after its own accept or reject.
    fn settle(&mut self, endpoint: &EndpointId) -> Option<TransportEvent> {
        let link = self.links.get_mut(endpoint)?;
        if link.established {
            return None;
        }
        let local = link.local?;
        let (success, code) = if !local || link.remote == Some(false) {
            (false, status::CONNECTION_REJECTED)
        } else if link.closed {
            (false, status::ERROR)
        } else if link.remote == Some(true) {
            (true, status::SUCCESS)
        } else {
            return None;
        };
        if success {
            link.established = true;
        } else {
            self.links.remove(endpoint);
        }
        Some(TransportEvent::ConnectionResolved {
            endpoint: endpoint.clone(),
            success,
            code,
        })
    }

    /// The socket behind `serial` is gone. An undecided handshake stays until the session
    /// decides; anything else is dropped and reported if the session knew about it.
    fn close(&mut self, endpoint: &EndpointId, serial: u64) -> Option<TransportEvent> {
        let link = self.links.get_mut(endpoint).filter(|l| l.serial == serial)?;
        if !link.established && link.local.is_none() {
            link.closed = true;
            return None;
        }
        let link = self.links.remove(endpoint)?;
        link.announced.then(|| closed_event(endpoint, link.established))
    }
}

/// State shared between the adapter and its background tasks.
#[derive(Clone)]
pub(crate) struct LinkContext {
    local_id: EndpointId,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<Command>,
    serials: Arc<AtomicU64>,
}

impl LinkContext {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(Command::Session(Input::Transport(event)));
    }

    fn next_serial(&self) -> u64 {
        self.serials.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn endpoint_seen(&self, endpoint: &EndpointId, name: &str, addr: SocketAddr, announce: bool) {
        self.lock().peers.insert(
            endpoint.clone(),
            Peer {
                addr,
                name: name.to_owned(),
            },
        );
        if announce {
            self.emit(TransportEvent::EndpointFound {
                endpoint: endpoint.clone(),
                name: name.to_owned(),
            });
        }
    }

    pub(crate) fn endpoint_lost(&self, endpoint: &EndpointId) {
        self.lock().peers.remove(endpoint);
        self.emit(TransportEvent::EndpointLost {
            endpoint: endpoint.clone(),
        });
    }

    /// Outbound socket is up: tell the session, unless an inbound link took its place.
    fn announce_outbound(&self, endpoint: &EndpointId, serial: u64, peer_name: &str) -> bool {
        let mut shared = self.lock();
        let Some(link) = shared.links.get_mut(endpoint).filter(|l| l.serial == serial) else {
            return false;
        };
        if !link.announced {
            link.announced = true;
            self.emit(TransportEvent::ConnectionInitiated {
                endpoint: endpoint.clone(),
                peer_name: peer_name.to_owned(),
            });
        }
        true
    }

    fn register_inbound(&self, endpoint: &EndpointId, name: &str, link: Link) -> bool {
        let mut shared = self.lock();
        match shared.links.get_mut(endpoint) {
            None => {
                shared.links.insert(endpoint.clone(), link);
                self.emit(TransportEvent::ConnectionInitiated {
                    endpoint: endpoint.clone(),
                    peer_name: name.to_owned(),
                });
                true
            }
            // Both sides dialed at once: the lower id keeps its outbound socket.
            Some(existing)
                if existing.outbound && !existing.established && self.local_id > *endpoint =>
            {
                debug!(endpoint = %endpoint, "simultaneous dial, adopting inbound link");
                let local = existing.local;
                let announced = existing.announced;
                if let Some(accepted) = local {
                    let _ = link.tx.send(LinkMessage::ConnectionResponse { accepted });
                }
                *existing = Link {
                    local,
                    announced: true,
                    ..link
                };
                if !announced {
                    self.emit(TransportEvent::ConnectionInitiated {
                        endpoint: endpoint.clone(),
                        peer_name: name.to_owned(),
                    });
                }
                true
            }
            Some(_) => {
                debug!(endpoint = %endpoint, "duplicate inbound link dropped");
                false
            }
        }
    }

    /// Returns false once the link is gone and the reader should stop.
    fn on_link_message(&self, endpoint: &EndpointId, serial: u64, msg: LinkMessage) -> bool {
        let mut shared = self.lock();
        let Some(link) = shared.links.get_mut(endpoint).filter(|l| l.serial == serial) else {
            return false;
        };
        match msg {
            LinkMessage::ConnectionResponse { accepted } => {
                link.remote = Some(accepted);
                if let Some(event) = shared.settle(endpoint) {
                    self.emit(event);
                }
                true
            }
            LinkMessage::Payload { bytes } => {
                if link.established {
                    self.emit(TransportEvent::PayloadReceived {
                        endpoint: endpoint.clone(),
                        bytes,
                    });
                } else {
                    debug!(endpoint = %endpoint, "payload before handshake dropped");
                }
                true
            }
            LinkMessage::Disconnect => {
                if let Some(event) = shared.close(endpoint, serial) {
                    self.emit(event);
                }
                false
            }
            other => {
                debug!(endpoint = %endpoint, ?other, "unexpected frame on link");
                true
            }
        }
    }

    fn on_link_closed(&self, endpoint: &EndpointId, serial: u64) {
        if let Some(event) = self.lock().close(endpoint, serial) {
            self.emit(event);
        }
    }

    fn drop_link(&self, endpoint: &EndpointId, serial: u64) -> bool {
        let mut shared = self.lock();
        if shared.links.get(endpoint).is_some_and(|l| l.serial == serial) {
            shared.links.remove(endpoint);
            return true;
        }
        false
    }
}

fn closed_event(endpoint: &EndpointId, established: bool) -> TransportEvent {
    if established {
        TransportEvent::Disconnected {
            endpoint: endpoint.clone(),
        }
    } else {
        TransportEvent::ConnectionResolved {
            endpoint: endpoint.clone(),
            success: false,
            code: status::ERROR,
        }
    }
}

fn io_error(e: std::io::Error) -> TransportError {
    TransportError::new(status::ERROR, e.to_string())
}

/// [`Transport`] over the local network. Must be used from inside a tokio runtime.
pub struct LanTransport {
    ctx: LinkContext,
    discovery_port: u16,
    transport_port: u16,
    advertiser: Option<JoinHandle<()>>,
    discoverer: Option<JoinHandle<()>>,
}

impl LanTransport {
    pub fn new(discovery_port: u16, transport_port: u16, events: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            ctx: LinkContext {
                local_id: EndpointId::generate(),
                shared: Arc::new(Mutex::new(Shared::default())),
                events,
                serials: Arc::new(AtomicU64::new(1)),
            },
            discovery_port,
            transport_port,
            advertiser: None,
            discoverer: None,
        }
    }

    pub fn local_id(&self) -> &EndpointId {
        &self.ctx.local_id
    }

    /// Wait up to `grace` for locally closed links to flush their `Disconnect`.
    pub async fn flush(&self, grace: Duration) {
        let pending = std::mem::take(&mut self.ctx.lock().closing);
        if pending.is_empty() {
            return;
        }
        let drained = tokio::time::timeout(grace, async {
            for done in pending {
                let _ = done.await;
            }
        })
        .await;
        if drained.is_err() {
            debug!("links still closing after grace period");
        }
    }

    #[cfg(test)]
    fn add_peer(&self, endpoint: &EndpointId, name: &str, addr: SocketAddr) {
        self.ctx.endpoint_seen(endpoint, name, addr, false);
    }
}

impl Drop for LanTransport {
    fn drop(&mut self) {
        self.stop_advertising();
        self.stop_discovery();
    }
}

impl Transport for LanTransport {
    fn advertise(&mut self, local_name: &str, service_id: &str) -> Result<(), TransportError> {
        if self.advertiser.is_some() {
            return Err(TransportError::new(
                status::ALREADY_ADVERTISING,
                "already advertising",
            ));
        }
        let listener = bind_listener(self.transport_port).map_err(io_error)?;
        let port = listener.local_addr().map_err(io_error)?.port();
        let socket = discovery::beacon_socket().map_err(io_error)?;
        let beacon = encode_frame(&LinkMessage::Beacon {
            protocol_version: PROTOCOL_VERSION,
            service_id: service_id.to_owned(),
            endpoint_id: self.ctx.local_id.clone(),
            name: local_name.to_owned(),
            listen_port: port,
        })
        .map_err(|e| TransportError::new(status::ERROR, e.to_string()))?;

        info!(port, service_id, "advertising");
        let ctx = self.ctx.clone();
        let discovery_port = self.discovery_port;
        self.advertiser = Some(tokio::spawn(async move {
            tokio::join!(
                discovery::beacon_loop(socket, beacon, discovery_port),
                accept_loop(listener, ctx),
            );
        }));
        Ok(())
    }

    fn stop_advertising(&mut self) {
        if let Some(task) = self.advertiser.take() {
            task.abort();
            debug!("advertising stopped");
        }
    }

    fn discover(&mut self, service_id: &str) -> Result<(), TransportError> {
        if self.discoverer.is_some() {
            return Err(TransportError::new(
                status::ALREADY_DISCOVERING,
                "already discovering",
            ));
        }
        let socket = discovery::multicast_socket(self.discovery_port).map_err(io_error)?;
        let table = EndpointTable::new(self.ctx.local_id.clone(), service_id);
        info!(port = self.discovery_port, service_id, "discovering");
        self.discoverer = Some(tokio::spawn(discovery::run_discovery(
            socket,
            table,
            self.ctx.clone(),
        )));
        Ok(())
    }

    /// Endpoints are only tracked while discovering; all of them are lost on stop.
    fn stop_discovery(&mut self) {
        if let Some(task) = self.discoverer.take() {
            task.abort();
            debug!("discovery stopped");
        }
        let lost: Vec<EndpointId> = self.ctx.lock().peers.drain().map(|(id, _)| id).collect();
        for endpoint in lost {
            self.ctx.emit(TransportEvent::EndpointLost { endpoint });
        }
    }

    fn request_connection(
        &mut self,
        local_name: &str,
        endpoint: &EndpointId,
    ) -> Result<(), TransportError> {
        let mut shared = self.ctx.lock();
        let Some(peer) = shared.peers.get(endpoint) else {
            return Err(TransportError::new(status::ENDPOINT_UNKNOWN, "endpoint unknown"));
        };
        if shared.links.contains_key(endpoint) {
            return Err(TransportError::new(
                status::ALREADY_CONNECTED_TO_ENDPOINT,
                "already connected to endpoint",
            ));
        }
        let addr = peer.addr;
        let peer_name = peer.name.clone();
        let serial = self.ctx.next_serial();
        let (link, io) = Link::open(serial, true);
        let _ = link.tx.send(LinkMessage::ConnectionRequest {
            endpoint_id: self.ctx.local_id.clone(),
            name: local_name.to_owned(),
        });
        shared.links.insert(endpoint.clone(), link);
        drop(shared);

        debug!(endpoint = %endpoint, %addr, "dialing");
        let ctx = self.ctx.clone();
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if ctx.announce_outbound(&endpoint, serial, &peer_name) {
                        run_link(stream, endpoint, serial, io, ctx).await;
                    }
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, %addr, error = %e, "dial failed");
                    if ctx.drop_link(&endpoint, serial) {
                        ctx.emit(TransportEvent::ConnectionResolved {
                            endpoint,
                            success: false,
                            code: status::ERROR,
                        });
                    }
                }
            }
        });
        Ok(())
    }

    fn accept_connection(&mut self, endpoint: &EndpointId) -> Result<(), TransportError> {
        self.decide(endpoint, true)
    }

    fn reject_connection(&mut self, endpoint: &EndpointId) -> Result<(), TransportError> {
        self.decide(endpoint, false)
    }

    fn send_payload(
        &mut self,
        endpoint: &EndpointId,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError> {
        let shared = self.ctx.lock();
        let link = shared
            .links
            .get(endpoint)
            .filter(|l| l.established)
            .ok_or_else(not_connected)?;
        let len = bytes.len() as u64;
        link.tx
            .send(LinkMessage::Payload { bytes })
            .map_err(|_| not_connected())?;
        drop(shared);
        self.ctx.emit(TransportEvent::PayloadTransferUpdate {
            endpoint: endpoint.clone(),
            progress: TransferProgress {
                bytes_transferred: len,
                total_bytes: len,
            },
        });
        Ok(())
    }

    fn disconnect(&mut self, endpoint: &EndpointId) {
        let mut shared = self.ctx.lock();
        if let Some(link) = shared.links.remove(endpoint) {
            let _ = link.tx.send(LinkMessage::Disconnect);
            shared
                .closing
                .retain_mut(|done| matches!(done.try_recv(), Err(TryRecvError::Empty)));
            shared.closing.push(link.done);
            debug!(endpoint = %endpoint, "link closed locally");
        }
    }
}

impl LanTransport {
    fn decide(&mut self, endpoint: &EndpointId, accepted: bool) -> Result<(), TransportError> {
        let mut shared = self.ctx.lock();
        let link = shared
            .links
            .get_mut(endpoint)
            .filter(|l| !l.established)
            .ok_or_else(not_connected)?;
        link.local = Some(accepted);
        let _ = link.tx.send(LinkMessage::ConnectionResponse { accepted });
        if let Some(event) = shared.settle(endpoint) {
            self.ctx.emit(event);
        }
        Ok(())
    }
}

fn not_connected() -> TransportError {
    TransportError::new(
        status::NOT_CONNECTED_TO_ENDPOINT,
        "not connected to endpoint",
    )
}

fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
    let std_listener = std::net::TcpListener::bind(("0.0.0.0", port))?;
    std_listener.set_nonblocking(true)?;
    TcpListener::from_std(std_listener)
}

async fn accept_loop(listener: TcpListener, ctx: LinkContext) {
    loop {
        match listener.accept().await {
            Ok((stream, from)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move { handle_inbound(stream, from, ctx).await });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }
}

async fn handle_inbound(mut stream: TcpStream, from: SocketAddr, ctx: LinkContext) {
    let first = match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_frame(&mut stream)).await {
        Ok(Ok(msg)) => msg,
        Ok(Err(e)) => {
            debug!(%from, error = %e, "inbound handshake failed");
            return;
        }
        Err(_) => {
            debug!(%from, "inbound handshake timed out");
            return;
        }
    };
    let LinkMessage::ConnectionRequest { endpoint_id, name } = first else {
        debug!(%from, "inbound link did not open with a request");
        return;
    };
    let serial = ctx.next_serial();
    let (link, io) = Link::open(serial, false);
    if ctx.register_inbound(&endpoint_id, &name, link) {
        run_link(stream, endpoint_id, serial, io, ctx).await;
    }
}

/// Drive one link until either side closes it.
async fn run_link(
    stream: TcpStream,
    endpoint: EndpointId,
    serial: u64,
    io: LinkIo,
    ctx: LinkContext,
) {
    let (mut reader, mut writer) = stream.into_split();
    let LinkIo { mut rx, done } = io;
    let mut writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match encode_frame(&msg) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "frame dropped");
                    continue;
                }
            };
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
        drop(done);
    });

    let reading = async {
        loop {
            let msg = read_frame(&mut reader).await?;
            if !ctx.on_link_message(&endpoint, serial, msg) {
                return Ok::<_, std::io::Error>(());
            }
        }
    };
    tokio::select! {
        res = reading => {
            if let Err(e) = res {
                debug!(endpoint = %endpoint, error = %e, "link read ended");
            }
        }
        // Sender dropped: the link was closed from this side.
        _ = &mut writer_task => {}
    }
    ctx.on_link_closed(&endpoint, serial);
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<LinkMessage> {
    let invalid =
        |e: FrameError| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string());
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let len = wire::frame_len(header).map_err(invalid)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    wire::decode_body(&body).map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nonet_core::{LocalIdentity, Notification, Session, SessionConfig};

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Command>) -> TransportEvent {
        let cmd = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed");
        match cmd {
            Command::Session(Input::Transport(event)) => event,
            other => panic!("unexpected command {other:?}"),
        }
    }

    /// Bind then drop to get a port nobody listens on.
    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn loopback(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn node_on(port: u16) -> (LanTransport, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (LanTransport::new(0, port, tx), rx)
    }

    fn node() -> (LanTransport, mpsc::UnboundedReceiver<Command>) {
        node_on(0)
    }

    /// Start an advertising node on a known port.
    fn listening_node() -> (LanTransport, mpsc::UnboundedReceiver<Command>, u16) {
        let port = free_port();
        let (mut b, b_rx) = node_on(port);
        b.advertise("bob", "svc").unwrap();
        (b, b_rx, port)
    }

    /// `a` dials a fresh advertising node, which is returned.
    async fn dial(
        a: &mut LanTransport,
        a_rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> (LanTransport, mpsc::UnboundedReceiver<Command>) {
        let (b, mut b_rx, port) = listening_node();
        let b_id = b.local_id().clone();
        a.add_peer(&b_id, "bob", loopback(port));
        a.request_connection("alice", &b_id).unwrap();

        assert_eq!(
            next_event(a_rx).await,
            TransportEvent::ConnectionInitiated {
                endpoint: b_id.clone(),
                peer_name: "bob".into()
            }
        );
        assert_eq!(
            next_event(&mut b_rx).await,
            TransportEvent::ConnectionInitiated {
                endpoint: a.local_id().clone(),
                peer_name: "alice".into()
            }
        );
        (b, b_rx)
    }

    fn remote_decision(t: &LanTransport, endpoint: &EndpointId) -> Option<bool> {
        t.ctx.lock().links.get(endpoint).and_then(|l| l.remote)
    }

    #[tokio::test]
    async fn handshake_chat_and_disconnect() {
        let (mut a, mut a_rx) = node();
        let (mut b, mut b_rx) = dial(&mut a, &mut a_rx).await;
        let a_id = a.local_id().clone();
        let b_id = b.local_id().clone();

        a.accept_connection(&b_id).unwrap();
        b.accept_connection(&a_id).unwrap();
        let resolved = |endpoint: &EndpointId| TransportEvent::ConnectionResolved {
            endpoint: endpoint.clone(),
            success: true,
            code: status::SUCCESS,
        };
        assert_eq!(next_event(&mut a_rx).await, resolved(&b_id));
        assert_eq!(next_event(&mut b_rx).await, resolved(&a_id));

        a.send_payload(&b_id, b"hi".to_vec()).unwrap();
        assert_eq!(
            next_event(&mut a_rx).await,
            TransportEvent::PayloadTransferUpdate {
                endpoint: b_id.clone(),
                progress: TransferProgress {
                    bytes_transferred: 2,
                    total_bytes: 2
                }
            }
        );
        assert_eq!(
            next_event(&mut b_rx).await,
            TransportEvent::PayloadReceived {
                endpoint: a_id.clone(),
                bytes: b"hi".to_vec()
            }
        );

        a.disconnect(&b_id);
        a.flush(Duration::from_secs(1)).await;
        assert!(a.ctx.lock().closing.is_empty());
        assert_eq!(
            next_event(&mut b_rx).await,
            TransportEvent::Disconnected { endpoint: a_id }
        );
        assert_eq!(
            a.send_payload(&b_id, b"late".to_vec()).unwrap_err().code,
            status::NOT_CONNECTED_TO_ENDPOINT
        );
    }

    #[tokio::test]
    async fn rejection_resolves_both_sides() {
        let (mut a, mut a_rx) = node();
        let (mut b, mut b_rx) = dial(&mut a, &mut a_rx).await;
        let a_id = a.local_id().clone();
        let b_id = b.local_id().clone();

        b.reject_connection(&a_id).unwrap();
        assert_eq!(
            next_event(&mut b_rx).await,
            TransportEvent::ConnectionResolved {
                endpoint: a_id,
                success: false,
                code: status::CONNECTION_REJECTED
            }
        );
        // A learns of the rejection once it has made its own decision.
        a.accept_connection(&b_id).unwrap();
        assert_eq!(
            next_event(&mut a_rx).await,
            TransportEvent::ConnectionResolved {
                endpoint: b_id.clone(),
                success: false,
                code: status::CONNECTION_REJECTED
            }
        );
        assert_eq!(
            a.send_payload(&b_id, b"x".to_vec()).unwrap_err().code,
            status::NOT_CONNECTED_TO_ENDPOINT
        );
    }

    #[tokio::test]
    async fn rejection_before_local_decision_reports_rejected() {
        let (a, mut a_rx) = node();
        let (mut b, mut b_rx, port) = listening_node();
        let b_id = b.local_id().clone();
        let a_id = a.local_id().clone();
        a.add_peer(&b_id, "bob", loopback(port));

        let config = SessionConfig {
            auto_connect: false,
            ..SessionConfig::default()
        };
        let identity = LocalIdentity::new("User1000");
        let mut session = Session::new(identity, config, a, Vec::<Notification>::new());
        session.handle_event(TransportEvent::EndpointFound {
            endpoint: b_id.clone(),
            name: "bob".into(),
        });
        session.connect(&b_id).unwrap();

        assert!(matches!(
            next_event(&mut b_rx).await,
            TransportEvent::ConnectionInitiated { .. }
        ));
        b.reject_connection(&a_id).unwrap();
        // The refusal lands on A while its own initiation is still queued.
        tokio::time::timeout(Duration::from_secs(5), async {
            while remote_decision(session.transport(), &b_id).is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("rejection never reached the requester");

        let initiated = next_event(&mut a_rx).await;
        assert!(matches!(initiated, TransportEvent::ConnectionInitiated { .. }));
        session.handle_event(initiated);
        let resolved = next_event(&mut a_rx).await;
        assert_eq!(
            resolved,
            TransportEvent::ConnectionResolved {
                endpoint: b_id.clone(),
                success: false,
                code: status::CONNECTION_REJECTED
            }
        );
        session.handle_event(resolved);

        let statuses: Vec<&str> = session
            .notifier()
            .iter()
            .filter_map(|n| match n {
                Notification::Status(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert!(statuses.contains(&"connection rejected"), "{statuses:?}");
        assert!(
            !statuses.iter().any(|s| s.starts_with("transport failure")),
            "{statuses:?}"
        );
        assert!(session.connection_state().is_idle());
    }

    #[tokio::test]
    async fn dial_failure_resolves_with_error() {
        let (mut a, mut a_rx) = node();
        let ghost = EndpointId::new("ghost");
        a.add_peer(&ghost, "ghost", loopback(free_port()));
        a.request_connection("alice", &ghost).unwrap();
        assert_eq!(
            next_event(&mut a_rx).await,
            TransportEvent::ConnectionResolved {
                endpoint: ghost,
                success: false,
                code: status::ERROR
            }
        );
    }

    #[tokio::test]
    async fn stopping_discovery_loses_known_endpoints() {
        let (mut a, mut a_rx) = node();
        let peer = EndpointId::new("ab12");
        a.add_peer(&peer, "bob", loopback(free_port()));

        a.stop_discovery();
        assert_eq!(
            next_event(&mut a_rx).await,
            TransportEvent::EndpointLost {
                endpoint: peer.clone()
            }
        );
        assert_eq!(
            a.request_connection("alice", &peer).unwrap_err().code,
            status::ENDPOINT_UNKNOWN
        );
        a.stop_discovery();
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn primitive_errors_carry_status_codes() {
        let (mut a, _rx) = node();
        let unknown = EndpointId::new("nobody");
        assert_eq!(
            a.request_connection("alice", &unknown).unwrap_err().code,
            status::ENDPOINT_UNKNOWN
        );
        assert_eq!(
            a.send_payload(&unknown, b"x".to_vec()).unwrap_err().code,
            status::NOT_CONNECTED_TO_ENDPOINT
        );
        assert_eq!(
            a.accept_connection(&unknown).unwrap_err().code,
            status::NOT_CONNECTED_TO_ENDPOINT
        );

        a.advertise("alice", "svc").unwrap();
        assert_eq!(
            a.advertise("alice", "svc").unwrap_err().code,
            status::ALREADY_ADVERTISING
        );
        a.stop_advertising();
        a.stop_advertising();
        a.advertise("alice", "svc").unwrap();
    }

    #[tokio::test]
    async fn read_frame_rejects_oversized_header() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&u32::MAX.to_le_bytes()).await.unwrap();
        let err = read_frame(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
