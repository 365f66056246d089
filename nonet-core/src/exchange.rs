//! Message exchange: text to payload and back, plus the visible transcript.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::SessionError;
use crate::identity::EndpointId;
use crate::lifecycle::ConnectionManager;
use crate::registry::EndpointRegistry;
use crate::transport::{TransferProgress, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Sent,
    Received,
}

/// One transcript entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Position in the transcript; keeps increasing across evictions.
    pub seq: u64,
    pub sender: String,
    pub text: String,
    pub direction: Direction,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sender, self.text)
    }
}

/// Append-only transcript, optionally capped (oldest entries evicted first).
#[derive(Debug, Default)]
pub struct Transcript {
    messages: VecDeque<Message>,
    next_seq: u64,
    limit: Option<usize>,
}

impl Transcript {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            messages: VecDeque::new(),
            next_seq: 0,
            limit,
        }
    }

    fn append(&mut self, sender: String, text: String, direction: Direction) -> Message {
        let msg = Message {
            seq: self.next_seq,
            sender,
            text,
            direction,
        };
        self.next_seq += 1;
        if let Some(limit) = self.limit {
            while self.messages.len() >= limit.max(1) {
                self.messages.pop_front();
            }
        }
        self.messages.push_back(msg.clone());
        msg
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Payload bytes for outbound text. No framing at this layer.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Inbound payload to text; invalid UTF-8 becomes U+FFFD instead of failing.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Debug, Default)]
pub struct MessageExchange {
    transcript: Transcript,
}

impl MessageExchange {
    pub fn new(transcript_limit: Option<usize>) -> Self {
        Self {
            transcript: Transcript::new(transcript_limit),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Send trimmed `text` to the connected endpoint and record it. Nothing is recorded
    /// unless the transport took the payload.
    pub fn send(
        &mut self,
        transport: &mut dyn Transport,
        connections: &ConnectionManager,
        local_name: &str,
        text: &str,
    ) -> Result<Message, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let endpoint = connections
            .active_endpoint()
            .ok_or(SessionError::NotConnected)?;
        transport.send_payload(endpoint, encode_text(text))?;
        debug!(endpoint = %endpoint, len = text.len(), "payload sent");
        Ok(self
            .transcript
            .append(local_name.to_owned(), text.to_owned(), Direction::Sent))
    }

    /// Record a payload from the connected endpoint. Payloads from anyone else are dropped.
    pub fn on_payload_received(
        &mut self,
        connections: &ConnectionManager,
        registry: &EndpointRegistry,
        endpoint: &EndpointId,
        bytes: &[u8],
    ) -> Option<Message> {
        if connections.active_endpoint() != Some(endpoint) {
            debug!(endpoint = %endpoint, len = bytes.len(), "payload from inactive endpoint dropped");
            return None;
        }
        let sender = registry
            .lookup(endpoint)
            .ok()
            .or_else(|| connections.offered_name(endpoint))
            .map_or_else(|| endpoint.to_string(), str::to_owned);
        Some(
            self.transcript
                .append(sender, decode_text(bytes), Direction::Received),
        )
    }

    pub fn on_transfer_update(&self, endpoint: &EndpointId, progress: TransferProgress) {
        trace!(
            endpoint = %endpoint,
            transferred = progress.bytes_transferred,
            total = progress.total_bytes,
            "payload transfer update"
        );
    }
}
