//! Connection lifecycle: the handshake state machine for the single connection slot.
//!
//! ```text
//!  idle ──initiate──> requesting ──initiated(same)──┐
//!   │                                               v
//!   └──initiated──> pending-accept ──accept──> resolving ──ok──> connected
//!                                                  │                 │
//!                                                  └──fail──> idle <─┘ disconnected
//! ```
//!
//! At most one connection exists at a time. While the slot is taken, new outbound attempts
//! fail and inbound requests from other endpoints are rejected; the active one is never
//! preempted.
//!
//! Inbound requests are accepted without asking the user: anyone advertising the same service
//! id can open a session while the slot is free.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::identity::EndpointId;
use crate::transport::{status, Transport};

/// Externally visible connection state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    Idle,
    Requesting(EndpointId),
    PendingAccept(EndpointId),
    Resolving(EndpointId),
    Connected(EndpointId),
}

impl ConnectionState {
    pub fn endpoint(&self) -> Option<&EndpointId> {
        match self {
            ConnectionState::Idle => None,
            ConnectionState::Requesting(id)
            | ConnectionState::PendingAccept(id)
            | ConnectionState::Resolving(id)
            | ConnectionState::Connected(id) => Some(id),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ConnectionState::Idle)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Requesting(id) => write!(f, "requesting {}", id),
            ConnectionState::PendingAccept(id) => write!(f, "pending accept from {}", id),
            ConnectionState::Resolving(id) => write!(f, "resolving {}", id),
            ConnectionState::Connected(id) => write!(f, "connected to {}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Requesting,
    PendingAccept,
    Resolving,
    Connected,
}

/// The connection slot's occupant.
#[derive(Debug, Clone)]
pub struct Connection {
    endpoint: EndpointId,
    phase: Phase,
    /// Name the peer offered when the handshake was initiated.
    peer_name: Option<String>,
    established_at: Option<Instant>,
}

impl Connection {
    fn new(endpoint: EndpointId, phase: Phase, peer_name: Option<String>) -> Self {
        Self {
            endpoint,
            phase,
            peer_name,
            established_at: None,
        }
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn peer_name(&self) -> Option<&str> {
        self.peer_name.as_deref()
    }

    /// Set once the connection reaches `connected`.
    pub fn established_at(&self) -> Option<Instant> {
        self.established_at
    }

    pub fn state(&self) -> ConnectionState {
        let id = self.endpoint.clone();
        match self.phase {
            Phase::Requesting => ConnectionState::Requesting(id),
            Phase::PendingAccept => ConnectionState::PendingAccept(id),
            Phase::Resolving => ConnectionState::Resolving(id),
            Phase::Connected => ConnectionState::Connected(id),
        }
    }
}

/// What happened to an incoming connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingDecision {
    Accepted,
    /// Slot busy with another endpoint.
    Rejected,
    /// Duplicate initiation for the endpoint already resolving or connected.
    Ignored,
}

/// What happened on a resolution event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Connected,
    /// Back to idle; carries `ConnectionRejected` or `ConnectionFailed(code)`.
    Failed(SessionError),
    Ignored,
}

/// Owns the single connection slot.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connection: Option<Connection>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map_or(ConnectionState::Idle, Connection::state)
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Endpoint of the connected session, if any.
    pub fn active_endpoint(&self) -> Option<&EndpointId> {
        self.connection
            .as_ref()
            .filter(|c| c.phase == Phase::Connected)
            .map(|c| &c.endpoint)
    }

    /// Name offered by `endpoint` during its handshake, if it occupies the slot.
    pub fn offered_name(&self, endpoint: &EndpointId) -> Option<&str> {
        self.connection
            .as_ref()
            .filter(|c| &c.endpoint == endpoint)
            .and_then(Connection::peer_name)
    }

    /// Ask the transport to connect to `endpoint`. Only valid from idle.
    pub fn initiate(
        &mut self,
        transport: &mut dyn Transport,
        local_name: &str,
        endpoint: &EndpointId,
    ) -> Result<(), SessionError> {
        if let Some(c) = &self.connection {
            return Err(match c.phase {
                Phase::Connected => SessionError::AlreadyConnected,
                _ => SessionError::ConnectionInProgress,
            });
        }
        transport.request_connection(local_name, endpoint)?;
        debug!(endpoint = %endpoint, "connection requested");
        self.connection = Some(Connection::new(endpoint.clone(), Phase::Requesting, None));
        Ok(())
    }

    /// Peer-initiated (or the far side of our own) handshake. Auto-accepts when the slot is
    /// free or already ours for this endpoint; rejects otherwise.
    pub fn on_incoming_request(
        &mut self,
        transport: &mut dyn Transport,
        endpoint: &EndpointId,
        peer_name: &str,
    ) -> Result<IncomingDecision, SessionError> {
        match &mut self.connection {
            None => {
                self.connection = Some(Connection::new(
                    endpoint.clone(),
                    Phase::PendingAccept,
                    Some(peer_name.to_owned()),
                ));
                self.accept(transport, endpoint)
            }
            Some(c) if &c.endpoint == endpoint => match c.phase {
                Phase::Requesting | Phase::PendingAccept => {
                    c.peer_name = Some(peer_name.to_owned());
                    self.accept(transport, endpoint)
                }
                Phase::Resolving | Phase::Connected => {
                    debug!(endpoint = %endpoint, "duplicate connection initiation ignored");
                    Ok(IncomingDecision::Ignored)
                }
            },
            Some(c) => {
                debug!(
                    endpoint = %endpoint,
                    current = %c.endpoint,
                    "slot busy, rejecting incoming connection"
                );
                if let Err(e) = transport.reject_connection(endpoint) {
                    warn!(endpoint = %endpoint, error = %e, "reject failed");
                }
                Ok(IncomingDecision::Rejected)
            }
        }
    }

    fn accept(
        &mut self,
        transport: &mut dyn Transport,
        endpoint: &EndpointId,
    ) -> Result<IncomingDecision, SessionError> {
        if let Err(e) = transport.accept_connection(endpoint) {
            self.connection = None;
            return Err(e.into());
        }
        if let Some(c) = &mut self.connection {
            c.phase = Phase::Resolving;
        }
        debug!(endpoint = %endpoint, "connection accepted, resolving");
        Ok(IncomingDecision::Accepted)
    }

    pub fn on_resolved(&mut self, endpoint: &EndpointId, success: bool, code: i32) -> Resolution {
        let Some(c) = self.connection.as_mut().filter(|c| &c.endpoint == endpoint) else {
            debug!(endpoint = %endpoint, "resolution for unrelated endpoint ignored");
            return Resolution::Ignored;
        };
        if c.phase == Phase::Connected {
            return Resolution::Ignored;
        }
        if success {
            c.phase = Phase::Connected;
            c.established_at = Some(Instant::now());
            debug!(endpoint = %endpoint, "connected");
            return Resolution::Connected;
        }
        self.connection = None;
        debug!(endpoint = %endpoint, code, "connection resolution failed");
        if code == status::CONNECTION_REJECTED {
            Resolution::Failed(SessionError::ConnectionRejected)
        } else {
            Resolution::Failed(SessionError::ConnectionFailed(code))
        }
    }

    /// Remote side went away. Returns whether the slot referenced `endpoint`.
    pub fn on_disconnected(&mut self, endpoint: &EndpointId) -> bool {
        if self.connection.as_ref().map(|c| &c.endpoint) != Some(endpoint) {
            return false;
        }
        self.connection = None;
        debug!(endpoint = %endpoint, "peer disconnected");
        true
    }

    /// Local teardown of whatever occupies the slot. Returns the endpoint that was dropped.
    pub fn disconnect(&mut self, transport: &mut dyn Transport) -> Option<EndpointId> {
        let c = self.connection.take()?;
        transport.disconnect(&c.endpoint);
        debug!(endpoint = %c.endpoint, "disconnected locally");
        Some(c.endpoint)
    }
}
