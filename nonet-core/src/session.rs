//! Session controller: the single owner of registry, connection slot and transcript.
//! Host passes intents and transport events; the controller calls the transport and reports
//! to the notifier.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::exchange::{Message, MessageExchange, Transcript};
use crate::identity::{EndpointId, LocalIdentity};
use crate::lifecycle::{ConnectionManager, ConnectionState, IncomingDecision, Resolution};
use crate::notify::Notifier;
use crate::registry::{Endpoint, EndpointRegistry, Found};
use crate::transport::{status, Transport, TransportEvent};

/// Advertising and discovery are independent toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Mode {
    pub advertising: bool,
    pub discovering: bool,
}

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    StartAdvertising,
    StopAdvertising,
    StartDiscovery,
    StopDiscovery,
    Connect(EndpointId),
    Disconnect,
    Send(String),
}

/// One entry of the serialized input queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Intent(Intent),
    Transport(TransportEvent),
}

impl From<Intent> for Input {
    fn from(i: Intent) -> Self {
        Input::Intent(i)
    }
}

impl From<TransportEvent> for Input {
    fn from(e: TransportEvent) -> Self {
        Input::Transport(e)
    }
}

pub struct Session<T, N> {
    identity: LocalIdentity,
    config: SessionConfig,
    transport: T,
    notifier: N,
    mode: Mode,
    registry: EndpointRegistry,
    connections: ConnectionManager,
    exchange: MessageExchange,
}

impl<T: Transport, N: Notifier> Session<T, N> {
    pub fn new(identity: LocalIdentity, config: SessionConfig, transport: T, notifier: N) -> Self {
        let exchange = MessageExchange::new(config.transcript_limit);
        Self {
            identity,
            config,
            transport,
            notifier,
            mode: Mode::default(),
            registry: EndpointRegistry::new(),
            connections: ConnectionManager::new(),
            exchange,
        }
    }

    pub fn local_name(&self) -> &str {
        self.identity.name()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connections.state()
    }

    /// When the current connection was established; `None` unless connected.
    pub fn connected_since(&self) -> Option<Instant> {
        self.connections
            .connection()
            .and_then(|c| c.established_at())
    }

    pub fn transcript(&self) -> &Transcript {
        self.exchange.transcript()
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.registry.endpoints()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    pub fn start_advertising(&mut self) -> Result<(), SessionError> {
        let name = self.identity.name().to_owned();
        if let Err(e) = self.transport.advertise(&name, &self.config.service_id) {
            warn!(error = %e, "advertise failed");
            return Err(self.fail(e.into()));
        }
        self.mode.advertising = true;
        info!(name = %name, service = %self.config.service_id, "advertising");
        self.notifier.on_status(&format!("Advertising as {}", name));
        Ok(())
    }

    /// No-op when not advertising.
    pub fn stop_advertising(&mut self) {
        if !self.mode.advertising {
            return;
        }
        self.transport.stop_advertising();
        self.mode.advertising = false;
        self.notifier.on_status("Advertising stopped");
    }

    /// (Re)start discovery. Any previous discovery is stopped first, so pressing this twice
    /// never reports a duplicate-discovery error.
    pub fn start_discovery(&mut self) -> Result<(), SessionError> {
        self.transport.stop_discovery();
        match self.transport.discover(&self.config.service_id) {
            Ok(()) => {
                self.notifier.on_status("Discovery started");
            }
            Err(e) if e.code == status::ALREADY_DISCOVERING => {
                self.notifier.on_status("Already discovering");
            }
            Err(e) => {
                self.mode.discovering = false;
                warn!(error = %e, "discovery failed");
                return Err(self.fail(e.into()));
            }
        }
        self.mode.discovering = true;
        info!(service = %self.config.service_id, "discovering");
        Ok(())
    }

    /// No-op when not discovering.
    pub fn stop_discovery(&mut self) {
        if !self.mode.discovering {
            return;
        }
        self.transport.stop_discovery();
        self.mode.discovering = false;
        self.notifier.on_status("Discovery stopped");
    }

    /// Request a connection to a discovered endpoint.
    pub fn connect(&mut self, endpoint: &EndpointId) -> Result<(), SessionError> {
        let peer = match self.registry.lookup(endpoint) {
            Ok(name) => name.to_owned(),
            Err(e) => return Err(self.fail(e)),
        };
        let before = self.connections.state();
        let result =
            self.connections
                .initiate(&mut self.transport, self.identity.name(), endpoint);
        if let Err(e) = result {
            return Err(self.fail(e));
        }
        self.notifier
            .on_status(&format!("Requested connection to {}", peer));
        self.publish_state(&before);
        Ok(())
    }

    /// Tear down the current connection or pending handshake. No-op when idle.
    pub fn disconnect(&mut self) {
        let before = self.connections.state();
        if let Some(endpoint) = self.connections.disconnect(&mut self.transport) {
            self.notifier
                .on_status(&format!("Disconnected from {}", endpoint));
            self.publish_state(&before);
        }
    }

    pub fn send(&mut self, text: &str) -> Result<Message, SessionError> {
        let result = self.exchange.send(
            &mut self.transport,
            &self.connections,
            self.identity.name(),
            text,
        );
        match result {
            Ok(msg) => {
                self.notifier.on_transcript_append(&msg);
                Ok(msg)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Fan one transport event out to registry, lifecycle and exchange.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::EndpointFound { endpoint, name } => {
                self.on_endpoint_found(endpoint, name)
            }
            TransportEvent::EndpointLost { endpoint } => {
                if self.registry.on_lost(&endpoint).is_some() {
                    debug!(endpoint = %endpoint, "endpoint lost");
                    self.notifier
                        .on_status(&format!("Lost endpoint: {}", endpoint));
                }
            }
            TransportEvent::ConnectionInitiated {
                endpoint,
                peer_name,
            } => self.on_connection_initiated(&endpoint, &peer_name),
            TransportEvent::ConnectionResolved {
                endpoint,
                success,
                code,
            } => self.on_connection_resolved(&endpoint, success, code),
            TransportEvent::Disconnected { endpoint } => {
                let before = self.connections.state();
                if self.connections.on_disconnected(&endpoint) {
                    self.notifier
                        .on_status(&format!("Disconnected from {}", endpoint));
                    self.publish_state(&before);
                }
            }
            TransportEvent::PayloadReceived { endpoint, bytes } => {
                if let Some(msg) = self.exchange.on_payload_received(
                    &self.connections,
                    &self.registry,
                    &endpoint,
                    &bytes,
                ) {
                    self.notifier.on_transcript_append(&msg);
                }
            }
            TransportEvent::PayloadTransferUpdate { endpoint, progress } => {
                self.exchange.on_transfer_update(&endpoint, progress)
            }
        }
    }

    /// Apply one queued input. Errors have already been reported to the notifier.
    pub fn dispatch(&mut self, input: Input) -> Result<(), SessionError> {
        match input {
            Input::Transport(event) => self.handle_event(event),
            Input::Intent(intent) => match intent {
                Intent::StartAdvertising => self.start_advertising()?,
                Intent::StopAdvertising => self.stop_advertising(),
                Intent::StartDiscovery => self.start_discovery()?,
                Intent::StopDiscovery => self.stop_discovery(),
                Intent::Connect(endpoint) => self.connect(&endpoint)?,
                Intent::Disconnect => self.disconnect(),
                Intent::Send(text) => {
                    self.send(&text)?;
                }
            },
        }
        Ok(())
    }

    fn on_endpoint_found(&mut self, endpoint: EndpointId, name: String) {
        match self.registry.on_found(endpoint.clone(), name.clone()) {
            Found::New => {
                debug!(endpoint = %endpoint, name = %name, "endpoint found");
                self.notifier
                    .on_status(&format!("Found {} ({})", name, endpoint));
            }
            Found::Renamed { previous } => {
                debug!(endpoint = %endpoint, previous = %previous, name = %name, "endpoint renamed");
                return;
            }
            Found::Unchanged => return,
        }
        if self.config.auto_connect && self.connections.state().is_idle() {
            if let Err(e) = self.connect(&endpoint) {
                debug!(endpoint = %endpoint, error = %e, "auto-connect failed");
            }
        }
    }

    fn on_connection_initiated(&mut self, endpoint: &EndpointId, peer_name: &str) {
        let before = self.connections.state();
        match self
            .connections
            .on_incoming_request(&mut self.transport, endpoint, peer_name)
        {
            Ok(IncomingDecision::Accepted) => {
                self.notifier
                    .on_status(&format!("Connection initiated with {}", peer_name));
            }
            Ok(IncomingDecision::Rejected) => {
                self.notifier.on_status(&format!(
                    "Rejected connection from {}: already busy",
                    peer_name
                ));
            }
            Ok(IncomingDecision::Ignored) => {}
            Err(e) => {
                self.fail(e);
            }
        }
        self.publish_state(&before);
    }

    fn on_connection_resolved(&mut self, endpoint: &EndpointId, success: bool, code: i32) {
        let before = self.connections.state();
        match self.connections.on_resolved(endpoint, success, code) {
            Resolution::Connected => {
                let name = self
                    .registry
                    .lookup(endpoint)
                    .ok()
                    .or_else(|| self.connections.offered_name(endpoint))
                    .map_or_else(|| endpoint.to_string(), str::to_owned);
                info!(endpoint = %endpoint, peer = %name, "session established");
                self.notifier.on_status(&format!("Connected to {}", name));
            }
            Resolution::Failed(e) => {
                self.fail(e);
            }
            Resolution::Ignored => {}
        }
        self.publish_state(&before);
    }

    fn publish_state(&mut self, before: &ConnectionState) {
        let now = self.connections.state();
        if &now != before {
            self.notifier.on_connection_state_changed(&now);
        }
    }

    /// Surface an error as a status line and hand it back.
    fn fail(&mut self, err: SessionError) -> SessionError {
        self.notifier.on_status(&err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Direction;
    use crate::notify::Notification;
    use crate::transport::mock::{Call, MockTransport};
    use crate::transport::TransferProgress;

    type TestSession = Session<MockTransport, Vec<Notification>>;

    fn session() -> TestSession {
        Session::new(
            LocalIdentity::new("User1000"),
            SessionConfig {
                auto_connect: false,
                ..SessionConfig::default()
            },
            MockTransport::default(),
            Vec::new(),
        )
    }

    fn ep(s: &str) -> EndpointId {
        EndpointId::new(s)
    }

    fn found(s: &mut TestSession, id: &str, name: &str) {
        s.handle_event(TransportEvent::EndpointFound {
            endpoint: ep(id),
            name: name.into(),
        });
    }

    /// Drive the handshake to connected as the requester.
    fn connect_to(s: &mut TestSession, id: &str, name: &str) {
        found(s, id, name);
        s.connect(&ep(id)).unwrap();
        s.handle_event(TransportEvent::ConnectionInitiated {
            endpoint: ep(id),
            peer_name: name.into(),
        });
        s.handle_event(TransportEvent::ConnectionResolved {
            endpoint: ep(id),
            success: true,
            code: status::SUCCESS,
        });
        assert_eq!(s.connection_state(), ConnectionState::Connected(ep(id)));
    }

    fn statuses(s: &TestSession) -> Vec<String> {
        s.notifier()
            .iter()
            .filter_map(|n| match n {
                Notification::Status(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn advertising_reports_local_name() {
        let mut s = session();
        s.start_advertising().unwrap();
        assert!(s.mode().advertising);
        assert_eq!(
            s.transport().calls,
            vec![Call::Advertise("User1000".into(), "nonet.chat.SERVICE".into())]
        );
        assert_eq!(statuses(&s), vec!["Advertising as User1000"]);
    }

    #[test]
    fn advertise_failure_reported_verbatim() {
        let mut s = session();
        s.transport.fail_advertise = Some(status::ALREADY_ADVERTISING);
        let err = s.start_advertising().unwrap_err();
        assert!(matches!(err, SessionError::TransportFailure(ref e) if e.code == status::ALREADY_ADVERTISING));
        assert!(!s.mode().advertising);
        assert!(statuses(&s)[0].contains("status=8001"));
    }

    #[test]
    fn stop_is_idempotent() {
        let mut s = session();
        s.stop_advertising();
        s.stop_discovery();
        assert!(s.transport().calls.is_empty());
        s.start_advertising().unwrap();
        s.stop_advertising();
        s.stop_advertising();
        assert_eq!(
            s.transport()
                .calls
                .iter()
                .filter(|c| **c == Call::StopAdvertising)
                .count(),
            1
        );
    }

    #[test]
    fn restarting_discovery_never_errors() {
        let mut s = session();
        s.start_discovery().unwrap();
        s.start_discovery().unwrap();
        assert!(s.mode().discovering);
        assert!(statuses(&s).iter().all(|m| m == "Discovery started"));
        let calls = &s.transport().calls;
        assert_eq!(
            calls.as_slice(),
            &[
                Call::StopDiscovery,
                Call::Discover("nonet.chat.SERVICE".into()),
                Call::StopDiscovery,
                Call::Discover("nonet.chat.SERVICE".into()),
            ]
        );
    }

    #[test]
    fn already_discovering_is_not_an_error() {
        let mut s = session();
        s.transport.fail_discover = Some(status::ALREADY_DISCOVERING);
        s.start_discovery().unwrap();
        assert_eq!(statuses(&s), vec!["Already discovering"]);
    }

    #[test]
    fn connect_to_unknown_endpoint_fails() {
        let mut s = session();
        assert_eq!(
            s.connect(&ep("nope")),
            Err(SessionError::UnknownEndpoint(ep("nope")))
        );
        found(&mut s, "a", "A");
        s.handle_event(TransportEvent::EndpointLost { endpoint: ep("a") });
        assert_eq!(
            s.connect(&ep("a")),
            Err(SessionError::UnknownEndpoint(ep("a")))
        );
    }

    #[test]
    fn second_connect_is_in_progress() {
        let mut s = session();
        found(&mut s, "a", "A");
        found(&mut s, "b", "B");
        s.connect(&ep("a")).unwrap();
        assert_eq!(s.connect(&ep("b")), Err(SessionError::ConnectionInProgress));
        assert_eq!(s.connection_state(), ConnectionState::Requesting(ep("a")));
    }

    #[test]
    fn incoming_while_connected_is_rejected() {
        let mut s = session();
        connect_to(&mut s, "a", "A");
        s.handle_event(TransportEvent::ConnectionInitiated {
            endpoint: ep("b"),
            peer_name: "B".into(),
        });
        assert_eq!(s.connection_state(), ConnectionState::Connected(ep("a")));
        assert_eq!(s.transport().calls.last(), Some(&Call::Reject(ep("b"))));
    }

    #[test]
    fn advertiser_side_handshake() {
        let mut s = session();
        s.start_advertising().unwrap();
        s.handle_event(TransportEvent::ConnectionInitiated {
            endpoint: ep("x"),
            peer_name: "User2222".into(),
        });
        assert_eq!(s.connection_state(), ConnectionState::Resolving(ep("x")));
        s.handle_event(TransportEvent::ConnectionResolved {
            endpoint: ep("x"),
            success: true,
            code: 0,
        });
        assert_eq!(s.connection_state(), ConnectionState::Connected(ep("x")));
        assert!(statuses(&s).contains(&"Connected to User2222".to_owned()));
        s.handle_event(TransportEvent::PayloadReceived {
            endpoint: ep("x"),
            bytes: b"hey".to_vec(),
        });
        assert_eq!(s.transcript().last().unwrap().sender, "User2222");
    }

    #[test]
    fn state_changes_are_published() {
        let mut s = session();
        connect_to(&mut s, "a", "A");
        let states: Vec<ConnectionState> = s
            .notifier()
            .iter()
            .filter_map(|n| match n {
                Notification::ConnectionStateChanged(st) => Some(st.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                ConnectionState::Requesting(ep("a")),
                ConnectionState::Resolving(ep("a")),
                ConnectionState::Connected(ep("a")),
            ]
        );
    }

    #[test]
    fn rejected_resolution_returns_to_idle() {
        let mut s = session();
        found(&mut s, "a", "A");
        s.connect(&ep("a")).unwrap();
        s.handle_event(TransportEvent::ConnectionResolved {
            endpoint: ep("a"),
            success: false,
            code: status::CONNECTION_REJECTED,
        });
        assert!(s.connection_state().is_idle());
        assert_eq!(statuses(&s).last().unwrap(), "connection rejected");
    }

    #[test]
    fn empty_send_fails_without_entry() {
        let mut s = session();
        connect_to(&mut s, "a", "A");
        assert_eq!(s.send(""), Err(SessionError::EmptyMessage));
        assert_eq!(s.send("   "), Err(SessionError::EmptyMessage));
        assert!(s.transcript().is_empty());
        assert!(s.transport().sends().is_empty());
    }

    #[test]
    fn send_while_not_connected_fails() {
        let mut s = session();
        assert_eq!(s.send("hi"), Err(SessionError::NotConnected));
        assert!(s.transcript().is_empty());
        assert_eq!(statuses(&s), vec!["not connected"]);
    }

    #[test]
    fn send_while_connected_appends_once() {
        let mut s = session();
        connect_to(&mut s, "a", "A");
        let msg = s.send("hi").unwrap();
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.direction, Direction::Sent);
        assert_eq!(s.transcript().len(), 1);
        assert_eq!(
            s.transport().sends(),
            vec![&Call::Send(ep("a"), b"hi".to_vec())]
        );
        assert!(s
            .notifier()
            .contains(&Notification::TranscriptAppend(msg.clone())));
    }

    #[test]
    fn received_payload_labeled_with_display_name() {
        let mut s = session();
        connect_to(&mut s, "a", "User5555");
        s.handle_event(TransportEvent::PayloadReceived {
            endpoint: ep("a"),
            bytes: b"hello".to_vec(),
        });
        assert_eq!(s.transcript().len(), 1);
        let msg = s.transcript().last().unwrap();
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.sender, "User5555");
        assert_eq!(msg.direction, Direction::Received);
    }

    #[test]
    fn transfer_updates_change_nothing() {
        let mut s = session();
        connect_to(&mut s, "a", "A");
        let before = s.notifier().len();
        s.handle_event(TransportEvent::PayloadTransferUpdate {
            endpoint: ep("a"),
            progress: TransferProgress {
                bytes_transferred: 5,
                total_bytes: 5,
            },
        });
        assert_eq!(s.notifier().len(), before);
        assert!(s.transcript().is_empty());
    }

    #[test]
    fn disconnect_event_clears_session() {
        let mut s = session();
        connect_to(&mut s, "a", "A");
        s.handle_event(TransportEvent::Disconnected { endpoint: ep("a") });
        assert!(s.connection_state().is_idle());
        assert_eq!(s.send("hi"), Err(SessionError::NotConnected));
        assert!(statuses(&s).contains(&"Disconnected from a".to_owned()));
    }

    #[test]
    fn disconnect_event_mid_handshake_returns_to_idle() {
        let mut s = session();
        found(&mut s, "a", "A");
        s.connect(&ep("a")).unwrap();
        s.handle_event(TransportEvent::Disconnected { endpoint: ep("a") });
        assert!(s.connection_state().is_idle());
        assert_eq!(
            s.notifier().last(),
            Some(&Notification::ConnectionStateChanged(ConnectionState::Idle))
        );

        s.connect(&ep("a")).unwrap();
        s.handle_event(TransportEvent::ConnectionInitiated {
            endpoint: ep("a"),
            peer_name: "A".into(),
        });
        assert_eq!(s.connection_state(), ConnectionState::Resolving(ep("a")));
        s.handle_event(TransportEvent::Disconnected { endpoint: ep("a") });
        assert!(s.connection_state().is_idle());
        assert_eq!(
            s.notifier().last(),
            Some(&Notification::ConnectionStateChanged(ConnectionState::Idle))
        );
        // The endpoint stays discovered and can be retried.
        s.connect(&ep("a")).unwrap();
    }

    #[test]
    fn disconnect_event_for_other_endpoint_is_ignored() {
        let mut s = session();
        found(&mut s, "a", "A");
        s.connect(&ep("a")).unwrap();
        let before = s.notifier().len();
        s.handle_event(TransportEvent::Disconnected { endpoint: ep("b") });
        assert_eq!(s.connection_state(), ConnectionState::Requesting(ep("a")));
        assert_eq!(s.notifier().len(), before);
    }

    #[test]
    fn incoming_while_requesting_other_is_rejected() {
        let mut s = session();
        found(&mut s, "a", "A");
        s.connect(&ep("a")).unwrap();
        s.handle_event(TransportEvent::ConnectionInitiated {
            endpoint: ep("b"),
            peer_name: "B".into(),
        });
        assert_eq!(s.connection_state(), ConnectionState::Requesting(ep("a")));
        assert_eq!(s.transport().calls.last(), Some(&Call::Reject(ep("b"))));
        assert_eq!(
            statuses(&s).last().map(String::as_str),
            Some("Rejected connection from B: already busy")
        );
    }

    #[test]
    fn failed_auto_connect_is_only_a_status() {
        let mut s = Session::new(
            LocalIdentity::new("User1000"),
            SessionConfig::default(),
            MockTransport::default(),
            Vec::new(),
        );
        s.transport.fail_request = Some(status::ERROR);
        found(&mut s, "a", "A");
        assert!(s.connection_state().is_idle());
        assert_eq!(s.endpoints().len(), 1);
        let st = statuses(&s);
        assert_eq!(st[0], "Found A (a)");
        assert!(st[1].contains("status=13"));
        assert!(!s
            .notifier()
            .iter()
            .any(|n| matches!(n, Notification::ConnectionStateChanged(_))));
    }

    #[test]
    fn connected_since_set_only_when_connected() {
        let mut s = session();
        found(&mut s, "a", "A");
        s.connect(&ep("a")).unwrap();
        assert!(s.connected_since().is_none());
        s.handle_event(TransportEvent::ConnectionInitiated {
            endpoint: ep("a"),
            peer_name: "A".into(),
        });
        s.handle_event(TransportEvent::ConnectionResolved {
            endpoint: ep("a"),
            success: true,
            code: status::SUCCESS,
        });
        assert!(s.connected_since().is_some());
        s.disconnect();
        assert!(s.connected_since().is_none());
    }

    #[test]
    fn local_disconnect_tells_transport() {
        let mut s = session();
        connect_to(&mut s, "a", "A");
        s.disconnect();
        assert!(s.connection_state().is_idle());
        assert_eq!(s.transport().calls.last(), Some(&Call::Disconnect(ep("a"))));
    }

    #[test]
    fn auto_connect_requests_first_found_endpoint() {
        let mut s = Session::new(
            LocalIdentity::new("User1000"),
            SessionConfig::default(),
            MockTransport::default(),
            Vec::new(),
        );
        found(&mut s, "a", "A");
        found(&mut s, "b", "B");
        assert_eq!(s.connection_state(), ConnectionState::Requesting(ep("a")));
        let requests = s
            .transport()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::RequestConnection(..)))
            .count();
        assert_eq!(requests, 1);
    }

    #[test]
    fn dispatch_routes_intents_and_events() {
        let mut s = session();
        s.dispatch(Intent::StartDiscovery.into()).unwrap();
        s.dispatch(
            TransportEvent::EndpointFound {
                endpoint: ep("a"),
                name: "A".into(),
            }
            .into(),
        )
        .unwrap();
        s.dispatch(Intent::Connect(ep("a")).into()).unwrap();
        assert_eq!(
            s.dispatch(Intent::Send("hi".into()).into()),
            Err(SessionError::NotConnected)
        );
        assert_eq!(s.endpoints().len(), 1);
    }
}
