//! LAN link protocol: the frames a local-network adapter exchanges with its peers.
//! Chat text travels inside `Payload` untouched; this layer adds no meaning to it.

use serde::{Deserialize, Serialize};

use crate::identity::EndpointId;

/// Current link protocol version. Carried in discovery beacons.
pub const PROTOCOL_VERSION: u8 = 1;

/// All link message types. Encoding is bincode; framing is length-prefix (see wire module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkMessage {
    /// Discovery: advertise presence under a service id.
    Beacon {
        protocol_version: u8,
        service_id: String,
        endpoint_id: EndpointId,
        name: String,
        listen_port: u16,
    },
    /// First frame on a new link, sent by the requester.
    ConnectionRequest { endpoint_id: EndpointId, name: String },
    /// Each side's accept/reject decision.
    ConnectionResponse { accepted: bool },
    /// Opaque application payload.
    Payload { bytes: Vec<u8> },
    /// Graceful close.
    Disconnect,
}
