//! NoNet chat core: peer discovery, connection lifecycle and message exchange over a local
//! link. Host-driven: no I/O; the host supplies a transport and passes its events in.

pub mod config;
pub mod error;
pub mod exchange;
pub mod ffi;
pub mod identity;
pub mod lifecycle;
pub mod notify;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
pub mod wire;

pub use config::{SessionConfig, DEFAULT_SERVICE_ID};
pub use error::SessionError;
pub use exchange::{Direction, Message, Transcript};
pub use identity::{EndpointId, LocalIdentity};
pub use lifecycle::{ConnectionManager, ConnectionState};
pub use notify::{Notification, Notifier};
pub use protocol::{LinkMessage, PROTOCOL_VERSION};
pub use registry::{DiscoveryState, Endpoint, EndpointRegistry};
pub use session::{Input, Intent, Mode, Session};
pub use transport::{status, TransferProgress, Transport, TransportError, TransportEvent};
pub use wire::{decode_frame, encode_frame, FrameError};
