//! Session configuration. Hosts load it however they like; the core only reads it.

use serde::Deserialize;

/// Service identifier advertised and discovered when none is configured.
pub const DEFAULT_SERVICE_ID: &str = "nonet.chat.SERVICE";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Only endpoints advertising the same id are discovered.
    pub service_id: String,
    /// Request a connection to every endpoint found while idle.
    pub auto_connect: bool,
    /// Cap on transcript entries kept in memory.
    pub transcript_limit: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_id: DEFAULT_SERVICE_ID.to_owned(),
            auto_connect: true,
            transcript_limit: None,
        }
    }
}
