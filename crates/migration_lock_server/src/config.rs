//! YAML configuration of the site server.
//!
//! ```yaml
//! listen: 127.0.0.1:8080
//! database: /var/lib/site/site.sqlite3
//! lock:
//!   secret: change-me
//!   admin_token: also-change-me
//!   checksum_auth: exact
//! site:
//!   utc_offset_minutes: -300
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use migration_lock::{LockConfig, SiteSettings};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

pub type ServerConfigResult<T> = Result<T, ServerConfigError>;

#[derive(Error, Debug)]
pub enum ServerConfigError {
    #[error("No server config found at this path: {0}")]
    ConfigMissing(PathBuf),

    #[error("Config deserialization error: {0}")]
    SerializationError(#[from] serde_yaml::Error),

    #[error("Error while reading the server config: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// The site database. Every server process of one site must point at the
    /// same file.
    pub database: PathBuf,

    pub lock: LockConfig,

    #[serde(default)]
    pub site: SiteSettings,

    /// Overrides the log filter, same syntax as `RUST_LOG`.
    #[serde(default)]
    pub tracing_override: Option<String>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Helper function to load a config from a YAML string.
fn config_from_yaml<T>(yaml: &str) -> ServerConfigResult<T>
where
    T: DeserializeOwned,
{
    serde_yaml::from_str(yaml).map_err(ServerConfigError::SerializationError)
}

impl ServerConfig {
    /// Create a server config from a YAML file path.
    pub fn load_yaml(path: &Path) -> ServerConfigResult<ServerConfig> {
        let config_yaml = std::fs::read_to_string(path).map_err(|err| match err {
            e @ std::io::Error { .. } if e.kind() == std::io::ErrorKind::NotFound => {
                ServerConfigError::ConfigMissing(path.into())
            }
            _ => err.into(),
        })?;
        config_from_yaml(&config_yaml)
    }
}
