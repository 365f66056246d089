//! Errors raised by session operations. None of them is fatal: after any of these the
//! session is back in an idle or connected state.

use crate::identity::EndpointId;
use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(EndpointId),
    #[error("already connected")]
    AlreadyConnected,
    #[error("connection already in progress")]
    ConnectionInProgress,
    #[error("connection failed (status={0})")]
    ConnectionFailed(i32),
    #[error("connection rejected")]
    ConnectionRejected,
    #[error("not connected")]
    NotConnected,
    #[error("enter a message")]
    EmptyMessage,
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),
}
