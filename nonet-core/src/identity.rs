//! Identities: the transport-assigned endpoint id and the local display name.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Opaque endpoint identifier assigned by the transport.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        EndpointId(id.into())
    }

    /// Fresh id for this node: first 8 hex chars of a v4 UUID.
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(8);
        EndpointId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        EndpointId(s.to_owned())
    }
}

impl From<String> for EndpointId {
    fn from(s: String) -> Self {
        EndpointId(s)
    }
}

/// Display name this node advertises. Chosen once at startup and never changed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LocalIdentity {
    name: String,
}

impl LocalIdentity {
    /// Use a configured name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Random name of the form `User1234`.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let n: u16 = rng.gen_range(1000..=9999);
        Self {
            name: format!("User{}", n),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
