//! Service configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid state-history endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Configuration for the state-history service.
///
/// Mirrors the three externally exposed options; parsing a CLI or config
/// file into this struct is the embedding application's concern.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory for the log files; resolved relative to the application
    /// data directory when not absolute.
    pub state_history_dir: PathBuf,
    /// Wipe the directory before opening the logs.
    pub delete_state_history: bool,
    /// Listen endpoint, an IP socket address literal.
    pub endpoint: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            state_history_dir: PathBuf::from("state-history"),
            delete_state_history: false,
            endpoint: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ServiceConfig {
    /// The log directory, joined to `data_dir` when relative.
    pub fn resolve_dir(&self, data_dir: &Path) -> PathBuf {
        if self.state_history_dir.is_absolute() {
            self.state_history_dir.clone()
        } else {
            data_dir.join(&self.state_history_dir)
        }
    }

    /// Parse the listen endpoint.
    ///
    /// Accepts IPv4 (`0.0.0.0:8080`) and bracketed IPv6 (`[::1]:8080`)
    /// literals; hostnames are rejected.
    pub fn parse_endpoint(&self) -> Result<SocketAddr, ConfigError> {
        self.endpoint
            .parse()
            .map_err(|err: std::net::AddrParseError| ConfigError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: err.to_string(),
            })
    }
}
