//! Session configuration.
//!
//! Loaded from `latchkey.toml` in the platform configuration directory
//! (`~/.config/latchkey/` on Linux) when present; every field has a default.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`SessionConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration directory not available.
    #[error("configuration directory not available")]
    ConfigDirUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name shown to the host for this sign-in method.
    pub sign_in_name: String,

    /// Keyring service that scopes stored secrets to the application.
    pub keyring_service: String,

    /// Storage key of the saved credential record.
    pub storage_key: String,

    /// Use the OS keyring when available.
    pub prefer_keyring: bool,

    /// Permissions requested at login. Empty requests the provider's defaults.
    pub permissions: Vec<String>,

    /// Profile fields fetched after an interactive login.
    pub profile_fields: Vec<String>,

    /// Running inside an app extension, where provider refresh is unreliable.
    pub extension_context: bool,

    /// Root of the provider's graph API.
    pub graph_base_url: String,

    /// Graph API version segment.
    pub graph_version: Option<String>,

    /// Timeout applied to graph requests, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sign_in_name: "Facebook".to_string(),
            keyring_service: "latchkey".to_string(),
            storage_key: "latchkey/saved-credentials".to_string(),
            prefer_keyring: true,
            permissions: Vec::new(),
            profile_fields: vec!["name".to_string(), "id".to_string()],
            extension_context: false,
            graph_base_url: "https://graph.facebook.com".to_string(),
            graph_version: Some("v8.0".to_string()),
            request_timeout_secs: 30,
        }
    }
}

impl SessionConfig {
    /// Path of the configuration file in the platform configuration directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("com", "latchkey", "latchkey")
            .ok_or(ConfigError::ConfigDirUnavailable)?;
        Ok(dirs.config_dir().join("latchkey.toml"))
    }

    /// Load from the default location, or defaults if the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(&Self::default_path()?)
    }

    /// Load from `path`, or defaults if the file is absent.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No configuration at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
