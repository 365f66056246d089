//! Endpoint registry: remote endpoints currently visible to discovery.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::SessionError;
use crate::identity::EndpointId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscoveryState {
    Discovered,
    Lost,
}

/// A remote peer's advertised presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    pub state: DiscoveryState,
}

/// Result of a found event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found {
    New,
    Renamed { previous: String },
    Unchanged,
}

/// Known endpoints keyed by id. Lost endpoints are evicted, so every entry is `Discovered`.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<EndpointId, Endpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, or refresh the name of, an endpoint.
    pub fn on_found(&mut self, id: EndpointId, name: impl Into<String>) -> Found {
        let name = name.into();
        match self.endpoints.get_mut(&id) {
            Some(existing) if existing.name == name => Found::Unchanged,
            Some(existing) => {
                let previous = std::mem::replace(&mut existing.name, name);
                Found::Renamed { previous }
            }
            None => {
                self.endpoints.insert(
                    id.clone(),
                    Endpoint {
                        id,
                        name,
                        state: DiscoveryState::Discovered,
                    },
                );
                Found::New
            }
        }
    }

    /// Evict an endpoint. Returns it marked `Lost`, or `None` if it was never known.
    pub fn on_lost(&mut self, id: &EndpointId) -> Option<Endpoint> {
        self.endpoints.remove(id).map(|mut e| {
            e.state = DiscoveryState::Lost;
            e
        })
    }

    pub fn lookup(&self, id: &EndpointId) -> Result<&str, SessionError> {
        self.endpoints
            .get(id)
            .map(|e| e.name.as_str())
            .ok_or_else(|| SessionError::UnknownEndpoint(id.clone()))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Snapshot sorted by id.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut list: Vec<Endpoint> = self.endpoints.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }
}
