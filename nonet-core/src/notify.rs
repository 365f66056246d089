//! Outward notification surface consumed by the UI.

use crate::exchange::Message;
use crate::lifecycle::ConnectionState;

pub trait Notifier {
    /// One-shot status line (also used for every operation error).
    fn on_status(&mut self, message: &str);

    fn on_transcript_append(&mut self, message: &Message);

    fn on_connection_state_changed(&mut self, state: &ConnectionState);
}

/// Owned form of a notification, for channels and recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Status(String),
    TranscriptAppend(Message),
    ConnectionStateChanged(ConnectionState),
}

impl Notifier for Vec<Notification> {
    fn on_status(&mut self, message: &str) {
        self.push(Notification::Status(message.to_owned()));
    }

    fn on_transcript_append(&mut self, message: &Message) {
        self.push(Notification::TranscriptAppend(message.clone()));
    }

    fn on_connection_state_changed(&mut self, state: &ConnectionState) {
        self.push(Notification::ConnectionStateChanged(state.clone()));
    }
}
