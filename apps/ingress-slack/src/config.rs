use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use seb_idempotency::EventStoreConfig;

const DEFAULT_BIND: &str = "0.0.0.0:8086";

#[derive(Debug, Clone)]
pub struct IngressConfig {
    pub bind: SocketAddr,
    /// JSON array of teams seeded into the directory at startup.
    pub teams_file: Option<PathBuf>,
    pub event_store: EventStoreConfig,
}

impl IngressConfig {
    pub fn from_env() -> Result<Self> {
        let bind = std::env::var("BIND").unwrap_or_else(|_| DEFAULT_BIND.into());
        let bind = bind
            .parse()
            .with_context(|| format!("invalid BIND address {bind}"))?;
        let teams_file = std::env::var("TEAMS_FILE")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Ok(Self {
            bind,
            teams_file,
            event_store: EventStoreConfig::from_env(),
        })
    }
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8086)),
            teams_file: None,
            event_store: EventStoreConfig::default(),
        }
    }
}
