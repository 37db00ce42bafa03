//! TOML-based configuration for Pkgscope.
//!
//! Supports a config file (pkgscope.toml) overriding the worker location
//! and the channel address.
//!
//! Example configuration:
//! ```toml
//! [worker]
//! path = "/opt/pkgscope/pkgscope-worker"
//! args = ["--inspection-depth", "full"]
//!
//! [channel]
//! host = "127.0.0.1"
//! port = 2525
//! connect_attempts = 20
//! connect_retry_ms = 250
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Worker process configuration.
    pub worker: WorkerSettings,

    /// Channel configuration.
    pub channel: ChannelSettings,
}

/// Worker process configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Worker executable override. When unset, the worker is expected
    /// next to the client binary under its well-known name.
    pub path: Option<PathBuf>,

    /// Extra arguments passed to the worker on start.
    pub args: Vec<String>,
}

/// Channel configuration.
///
/// The worker listens on a fixed loopback address shared by convention;
/// there is no discovery protocol.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Host the worker listens on.
    pub host: String,

    /// Port the worker listens on.
    pub port: u16,

    /// Connection attempts while the worker binds its listener.
    pub connect_attempts: u32,

    /// Delay between connection attempts, in milliseconds.
    pub connect_retry_ms: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2525,
            connect_attempts: 20,
            connect_retry_ms: 250,
        }
    }
}

impl ChannelSettings {
    /// Delay between connection attempts.
    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `PKGSCOPE_CONFIG`
    /// 2. `./pkgscope.toml`
    /// 3. `~/.config/pkgscope/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("PKGSCOPE_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("pkgscope.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("pkgscope").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}
