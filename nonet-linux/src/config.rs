//! Load config from file and environment.

use std::path::PathBuf;

use nonet_core::{LocalIdentity, SessionConfig, DEFAULT_SERVICE_ID};
use serde::Deserialize;
use tracing::warn;

/// Daemon configuration. File: ~/.config/nonet/config.toml or /etc/nonet/config.toml.
/// Env overrides: NONET_DISPLAY_NAME, NONET_SERVICE_ID, NONET_DISCOVERY_PORT,
/// NONET_TRANSPORT_PORT, NONET_AUTO_CONNECT, NONET_TRANSCRIPT_LIMIT.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Fixed display name; random `UserNNNN` when unset.
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_service_id")]
    pub service_id: String,
    /// Multicast beacon UDP port (default 45680).
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Link TCP port while advertising (default 45681; 0 picks a free port).
    #[serde(default = "default_transport_port")]
    pub transport_port: u16,
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    #[serde(default)]
    pub transcript_limit: Option<usize>,
}

fn default_service_id() -> String {
    DEFAULT_SERVICE_ID.to_owned()
}
fn default_discovery_port() -> u16 {
    45680
}
fn default_transport_port() -> u16 {
    45681
}
fn default_auto_connect() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_name: None,
            service_id: default_service_id(),
            discovery_port: default_discovery_port(),
            transport_port: default_transport_port(),
            auto_connect: default_auto_connect(),
            transcript_limit: None,
        }
    }
}

impl Config {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            service_id: self.service_id.clone(),
            auto_connect: self.auto_connect,
            transcript_limit: self.transcript_limit,
        }
    }

    /// Local identity, fixed for the process lifetime.
    pub fn identity(&self) -> LocalIdentity {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => LocalIdentity::new(name),
            _ => LocalIdentity::generate(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

/// Apply overrides; unparsable values are ignored with a warning.
pub fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("NONET_DISPLAY_NAME") {
        c.display_name = Some(s);
    }
    if let Some(s) = var("NONET_SERVICE_ID") {
        c.service_id = s;
    }
    if let Some(p) = parse_var(&var, "NONET_DISCOVERY_PORT") {
        c.discovery_port = p;
    }
    if let Some(p) = parse_var(&var, "NONET_TRANSPORT_PORT") {
        c.transport_port = p;
    }
    if let Some(b) = parse_var(&var, "NONET_AUTO_CONNECT") {
        c.auto_connect = b;
    }
    if let Some(n) = parse_var(&var, "NONET_TRANSCRIPT_LIMIT") {
        c.transcript_limit = Some(n);
    }
}

fn parse_var<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let s = var(key)?;
    match s.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %s, "ignoring unparsable environment override");
            None
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/nonet/config.toml"));
    }
    out.push(PathBuf::from("/etc/nonet/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    let s = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read config file");
            return None;
        }
    };
    match toml::from_str::<Config>(&s) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
            None
        }
    }
}
