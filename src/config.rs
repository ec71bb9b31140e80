//! Settings for station pulls.
//!
//! Read from a JSON file in the user's config directory (or an explicit
//! `--config` path). Every field has a default, so the file may list only
//! what differs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::ExtractOptions;
use crate::net::Credentials;
use crate::orchestrator::OrchestratorOptions;

const APP_DIR: &str = "station-pull";
const CONFIG_FILE: &str = "config.json";

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// How station shares are reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShareMode {
    /// Authenticate with `net use` and read `\\<address>\<share_name>`
    NetUse,
    /// Shares are already mounted at `<mount_root>/<address>`
    Mounted { mount_root: PathBuf },
}

impl Default for ShareMode {
    fn default() -> Self {
        ShareMode::NetUse
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Share holding the camera output on each station
    pub share_name: String,
    /// Account tried before prompting
    pub default_user: String,
    pub default_secret: String,
    pub share_mode: ShareMode,
    pub probe_timeout_ms: u64,
    pub auth_timeout_secs: u64,
    /// Zero disables the per-file copy timeout
    pub copy_timeout_secs: u64,
    pub monitor_interval_secs: u64,
    pub max_auth_attempts: u32,
    /// Folder prefix for targets without a station label
    pub station_placeholder: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            share_name: "mtxuser".to_string(),
            default_user: r"NAM\mtxuser".to_string(),
            default_secret: "Matrox".to_string(),
            share_mode: ShareMode::default(),
            probe_timeout_ms: 1000,
            auth_timeout_secs: 30,
            copy_timeout_secs: 120,
            monitor_interval_secs: 5,
            max_auth_attempts: 3,
            station_placeholder: "Station".to_string(),
        }
    }
}

impl AppConfig {
    /// Default location: `<config_dir>/station-pull/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load `explicit` (which must exist), or the default file if present,
    /// or built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "monitor_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.max_auth_attempts == 0 {
            return Err(ConfigError::Invalid("max_auth_attempts must be at least 1".to_string()));
        }
        if self.probe_timeout_ms == 0 || self.auth_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "probe and auth timeouts must be non-zero".to_string(),
            ));
        }
        if self.share_name.trim().is_empty() {
            return Err(ConfigError::Invalid("share_name is empty".to_string()));
        }
        Ok(())
    }

    pub fn default_credentials(&self) -> Credentials {
        Credentials::new(self.default_user.clone(), self.default_secret.clone())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            copy_timeout: (self.copy_timeout_secs > 0)
                .then(|| Duration::from_secs(self.copy_timeout_secs)),
            station_placeholder: self.station_placeholder.clone(),
        }
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            max_auth_attempts: self.max_auth_attempts,
            monitor_interval: Duration::from_secs(self.monitor_interval_secs),
        }
    }
}
