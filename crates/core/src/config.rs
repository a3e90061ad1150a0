//! Server configuration schema and loading.
//!
//! Field names match the TOML schema the server has always used
//! (`Address`, `Timeout`, `Drive`, `Auth`, ...), hence the PascalCase
//! renames. `Timeout` is a humantime string such as `"3s"`.

use crate::error::{Error, Result};
use figment::Figment;
use figment::providers::{Format, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerConfig {
    /// Listen address. A bare `:port` form binds all interfaces.
    #[serde(default = "default_address")]
    pub address: String,

    /// Per-operation I/O deadline, e.g. `"3s"`.
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Capacity of the pending-request queue. A full queue blocks accept,
    /// which is the admission-control mechanism.
    #[serde(default = "default_backlog")]
    pub backlog: usize,

    /// Number of worker tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub skip_verification: bool,

    /// TLS certificate chain / private key file pairs.
    #[serde(default)]
    pub certificate: Vec<CertificateConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Exposed drives.
    #[serde(default)]
    pub drive: Vec<DriveConfig>,

    /// Authentication key table.
    #[serde(default)]
    pub auth: Vec<AuthConfig>,
}

/// One TLS certificate entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Logging options.
///
/// `Level` is `none` (silence everything), `error` (errors only), or
/// anything else including `info` (full informational logging). An empty
/// `File` logs to stdout.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// One exposed drive: a name clients address and the host directory
/// backing it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriveConfig {
    pub name: String,
    pub path: PathBuf,
}

/// One authentication key entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthConfig {
    pub key: String,
    #[serde(rename = "AllowedIPs")]
    pub allowed_ips: Vec<String>,
    pub allowed_drives: Vec<String>,
    #[serde(default)]
    pub can_write: bool,
}

fn default_address() -> String {
    ":20001".to_string()
}

fn default_timeout() -> String {
    "3s".to_string()
}

fn default_backlog() -> usize {
    10
}

fn default_workers() -> usize {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            timeout: default_timeout(),
            backlog: default_backlog(),
            workers: default_workers(),
            skip_verification: false,
            certificate: Vec::new(),
            logging: LoggingConfig::default(),
            drive: Vec::new(),
            auth: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let config: ServerConfig = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the constraints the schema cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(Error::Config("address must not be empty".to_string()));
        }
        if self.backlog == 0 {
            return Err(Error::Config("backlog must be at least 1".to_string()));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        self.timeout_duration()?;
        for drive in &self.drive {
            if drive.name.is_empty() || drive.path.as_os_str().is_empty() {
                return Err(Error::Config(
                    "drive configuration must contain name and path".to_string(),
                ));
            }
        }
        for auth in &self.auth {
            if auth.key.is_empty() {
                return Err(Error::Config(
                    "auth configuration must contain a key".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The `Timeout` field parsed as a duration.
    pub fn timeout_duration(&self) -> Result<Duration> {
        humantime::parse_duration(&self.timeout)
            .map_err(|err| Error::Config(format!("invalid timeout {:?}: {err}", self.timeout)))
    }

    /// The listen address in a form `TcpListener::bind` accepts. The
    /// original schema allows a bare `:20001`, which binds all interfaces.
    pub fn listen_addr(&self) -> String {
        if self.address.starts_with(':') {
            format!("0.0.0.0{}", self.address)
        } else {
            self.address.clone()
        }
    }
}
