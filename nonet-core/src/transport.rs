//! Transport adapter seam: the primitives the session calls into and the events an adapter
//! pushes back. Calls never block; outcomes arrive later as [`TransportEvent`]s.

use crate::identity::EndpointId;

/// Status codes shared with adapters (nearby-connections numbering).
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const ERROR: i32 = 13;
    pub const ALREADY_ADVERTISING: i32 = 8001;
    pub const ALREADY_DISCOVERING: i32 = 8002;
    pub const ALREADY_CONNECTED_TO_ENDPOINT: i32 = 8003;
    pub const CONNECTION_REJECTED: i32 = 8004;
    pub const NOT_CONNECTED_TO_ENDPOINT: i32 = 8005;
    pub const ENDPOINT_UNKNOWN: i32 = 8011;
}

/// Failure reported synchronously by an adapter primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (status={code})")]
pub struct TransportError {
    pub code: i32,
    pub message: String,
}

impl TransportError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Primitives of the local link. Implemented by the platform adapter (LAN daemon, C host).
pub trait Transport {
    fn advertise(&mut self, local_name: &str, service_id: &str) -> Result<(), TransportError>;

    /// Idempotent.
    fn stop_advertising(&mut self);

    fn discover(&mut self, service_id: &str) -> Result<(), TransportError>;

    /// Idempotent.
    fn stop_discovery(&mut self);

    fn request_connection(
        &mut self,
        local_name: &str,
        endpoint: &EndpointId,
    ) -> Result<(), TransportError>;

    fn accept_connection(&mut self, endpoint: &EndpointId) -> Result<(), TransportError>;

    fn reject_connection(&mut self, endpoint: &EndpointId) -> Result<(), TransportError>;

    /// Fire-and-forget; no delivery acknowledgement.
    fn send_payload(&mut self, endpoint: &EndpointId, bytes: Vec<u8>)
        -> Result<(), TransportError>;

    fn disconnect(&mut self, endpoint: &EndpointId);
}

/// Progress of one payload transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// Asynchronous notifications from the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    EndpointFound {
        endpoint: EndpointId,
        name: String,
    },
    EndpointLost {
        endpoint: EndpointId,
    },
    /// Seen by both sides of a handshake; each must accept or reject.
    ConnectionInitiated {
        endpoint: EndpointId,
        peer_name: String,
    },
    ConnectionResolved {
        endpoint: EndpointId,
        success: bool,
        code: i32,
    },
    Disconnected {
        endpoint: EndpointId,
    },
    PayloadReceived {
        endpoint: EndpointId,
        bytes: Vec<u8>,
    },
    PayloadTransferUpdate {
        endpoint: EndpointId,
        progress: TransferProgress,
    },
}
