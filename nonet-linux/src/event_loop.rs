//! Single owner of the session. UI commands and transport events share one queue and are
//! applied strictly one at a time.

use nonet_core::{
    ConnectionState, DiscoveryState, Input, Message, Notification, Notifier, Session, Transport,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Session(Input),
    Peers,
    Status,
    Quit,
}

impl From<Input> for Command {
    fn from(input: Input) -> Self {
        Command::Session(input)
    }
}

/// Forwards notifications to the terminal printer.
pub struct ChannelNotifier(mpsc::UnboundedSender<Notification>);

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self(tx)
    }
}

impl Notifier for ChannelNotifier {
    fn on_status(&mut self, message: &str) {
        let _ = self.0.send(Notification::Status(message.to_owned()));
    }

    fn on_transcript_append(&mut self, message: &Message) {
        let _ = self.0.send(Notification::TranscriptAppend(message.clone()));
    }

    fn on_connection_state_changed(&mut self, state: &ConnectionState) {
        let _ = self
            .0
            .send(Notification::ConnectionStateChanged(state.clone()));
    }
}

/// Apply commands until `Quit` or until every sender is gone. Returns the session so the
/// caller decides when the transport is dropped.
pub async fn run<T: Transport, N: Notifier>(
    mut session: Session<T, N>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> Session<T, N> {
    while let Some(cmd) = commands.recv().await {
        match cmd {
            Command::Session(input) => {
                if let Err(e) = session.dispatch(input) {
                    debug!(error = %e, "command failed");
                }
            }
            Command::Peers => {
                let text = peers_summary(&session);
                session.notifier_mut().on_status(&text);
            }
            Command::Status => {
                let text = status_summary(&session);
                session.notifier_mut().on_status(&text);
            }
            Command::Quit => break,
        }
    }
    info!("shutting down");
    session.disconnect();
    session.stop_discovery();
    session.stop_advertising();
    session
}

fn peers_summary<T: Transport, N: Notifier>(session: &Session<T, N>) -> String {
    let found: Vec<String> = session
        .endpoints()
        .into_iter()
        .filter(|e| e.state == DiscoveryState::Discovered)
        .map(|e| format!("{} ({})", e.name, e.id))
        .collect();
    if found.is_empty() {
        "No endpoints discovered".to_owned()
    } else {
        format!("Endpoints: {}", found.join(", "))
    }
}

fn status_summary<T: Transport, N: Notifier>(session: &Session<T, N>) -> String {
    let mode = session.mode();
    let mut text = format!(
        "{} | advertising: {} | discovering: {} | {}",
        session.local_name(),
        if mode.advertising { "on" } else { "off" },
        if mode.discovering { "on" } else { "off" },
        session.connection_state(),
    );
    if let Some(since) = session.connected_since() {
        text.push_str(&format!(" for {}s", since.elapsed().as_secs()));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use nonet_core::{
        EndpointId, Intent, LocalIdentity, SessionConfig, TransportError, TransportEvent,
    };

    /// Accepts everything and records nothing.
    #[derive(Default)]
    struct NullTransport {
        sent: Vec<Vec<u8>>,
    }

    impl Transport for NullTransport {
        fn advertise(&mut self, _: &str, _: &str) -> Result<(), TransportError> {
            Ok(())
        }
        fn stop_advertising(&mut self) {}
        fn discover(&mut self, _: &str) -> Result<(), TransportError> {
            Ok(())
        }
        fn stop_discovery(&mut self) {}
        fn request_connection(&mut self, _: &str, _: &EndpointId) -> Result<(), TransportError> {
            Ok(())
        }
        fn accept_connection(&mut self, _: &EndpointId) -> Result<(), TransportError> {
            Ok(())
        }
        fn reject_connection(&mut self, _: &EndpointId) -> Result<(), TransportError> {
            Ok(())
        }
        fn send_payload(&mut self, _: &EndpointId, bytes: Vec<u8>) -> Result<(), TransportError> {
            self.sent.push(bytes);
            Ok(())
        }
        fn disconnect(&mut self, _: &EndpointId) {}
    }

    fn session() -> Session<NullTransport, Vec<Notification>> {
        Session::new(
            LocalIdentity::new("User1000"),
            SessionConfig::default(),
            NullTransport::default(),
            Vec::new(),
        )
    }

    fn ev(event: TransportEvent) -> Command {
        Input::Transport(event).into()
    }

    #[tokio::test]
    async fn discovery_to_chat_through_one_queue() {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = EndpointId::new("ab12");
        tx.send(Input::Intent(Intent::StartDiscovery).into()).unwrap();
        tx.send(ev(TransportEvent::EndpointFound {
            endpoint: peer.clone(),
            name: "User4321".into(),
        }))
        .unwrap();
        tx.send(ev(TransportEvent::ConnectionInitiated {
            endpoint: peer.clone(),
            peer_name: "User4321".into(),
        }))
        .unwrap();
        tx.send(ev(TransportEvent::ConnectionResolved {
            endpoint: peer.clone(),
            success: true,
            code: 0,
        }))
        .unwrap();
        tx.send(Input::Intent(Intent::Send("hello".into())).into())
            .unwrap();
        tx.send(ev(TransportEvent::PayloadReceived {
            endpoint: peer.clone(),
            bytes: b"hi back".to_vec(),
        }))
        .unwrap();
        tx.send(Command::Status).unwrap();
        tx.send(Command::Quit).unwrap();

        let session = run(session(), rx).await;
        assert!(session.notifier().iter().any(|n| matches!(
            n,
            Notification::Status(s)
                if s.starts_with("User1000 | advertising: off | discovering: on | connected to ab12 for ")
        )));
        let texts: Vec<String> = session.transcript().messages().map(|m| m.to_string()).collect();
        assert_eq!(texts, vec!["User1000: hello", "User4321: hi back"]);
        assert_eq!(session.transport().sent, vec![b"hello".to_vec()]);
        // Quit tears the connection down.
        assert!(session.connection_state().is_idle());
    }

    #[tokio::test]
    async fn peers_and_status_are_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Command::Peers).unwrap();
        tx.send(ev(TransportEvent::EndpointFound {
            endpoint: "ab12".into(),
            name: "User4321".into(),
        }))
        .unwrap();
        tx.send(ev(TransportEvent::EndpointLost {
            endpoint: "ab12".into(),
        }))
        .unwrap();
        tx.send(ev(TransportEvent::EndpointFound {
            endpoint: "cd34".into(),
            name: "User5678".into(),
        }))
        .unwrap();
        tx.send(Command::Peers).unwrap();
        tx.send(Command::Status).unwrap();
        drop(tx);

        let session = run(session(), rx).await;
        let statuses: Vec<&str> = session
            .notifier()
            .iter()
            .filter_map(|n| match n {
                Notification::Status(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert!(statuses.contains(&"No endpoints discovered"));
        assert!(statuses.contains(&"Endpoints: User5678 (cd34)"));
        assert!(statuses
            .iter()
            .any(|s| s.starts_with("User1000 | advertising: off | discovering: off")));
    }

    #[tokio::test]
    async fn channel_notifier_forwards_everything() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut notifier = ChannelNotifier::new(tx);
        notifier.on_status("Discovery started");
        notifier.on_connection_state_changed(&ConnectionState::Idle);
        assert_eq!(
            rx.recv().await,
            Some(Notification::Status("Discovery started".into()))
        );
        assert_eq!(
            rx.recv().await,
            Some(Notification::ConnectionStateChanged(ConnectionState::Idle))
        );
    }
}
