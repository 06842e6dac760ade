//! Player configuration management.
//!
//! Handles loading and saving the streaming-provider settings the playback
//! core needs: the OAuth client identifier, the redirect URI the provider
//! sends the authorization code back to, and the initial player volume.
//! Values can also be supplied through the environment, which takes
//! precedence over the config file.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Permission scopes requested at login.
///
/// These cover streaming playback plus read/modify access to the player
/// state, which the session orchestrator needs for its commands.
pub const DEFAULT_SCOPES: &[&str] = &[
    "streaming",
    "user-read-email",
    "user-read-private",
    "user-modify-playback-state",
    "user-read-playback-state",
];

/// Default redirect URI used during local development.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:5173/historical-jams";

/// Default volume for a freshly created player device (0.0 - 1.0).
pub const DEFAULT_VOLUME: f32 = 0.8;

/// Environment variable overriding the client identifier.
pub const ENV_CLIENT_ID: &str = "JAMS_CLIENT_ID";

/// Environment variable overriding the redirect URI.
pub const ENV_REDIRECT_URI: &str = "JAMS_REDIRECT_URI";

/// Player configuration.
///
/// An empty `client_id` is tolerated here; it only becomes a hard
/// [`Error::Configuration`] when a login is actually initiated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    /// OAuth client identifier issued by the streaming provider.
    #[serde(default)]
    pub client_id: String,
    /// Redirect URI registered with the provider.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Initial volume for the playback device (0.0 - 1.0).
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

const fn default_volume() -> f32 {
    DEFAULT_VOLUME
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: default_redirect_uri(),
            volume: DEFAULT_VOLUME,
        }
    }
}

impl PlayerConfig {
    /// Load configuration from disk, then apply environment overrides.
    ///
    /// Missing config file is not an error; defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(|e| Error::Storage {
                path: config_path.clone(),
                message: format!("Failed to read config file: {e}"),
            })?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;
            info!("Loaded player config from {}", config_path.display());
            config
        } else {
            debug!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Save configuration to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<()> {
        let config_path = config_file_path();

        if let Some(parent) = config_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| Error::Storage {
                path: parent.to_path_buf(),
                message: format!("Failed to create config directory: {e}"),
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, content).map_err(|e| Error::Storage {
            path: config_path.clone(),
            message: format!("Failed to write config file: {e}"),
        })?;

        info!("Saved player config to {}", config_path.display());
        Ok(())
    }

    /// Build a configuration purely from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Overwrite fields from `JAMS_CLIENT_ID` / `JAMS_REDIRECT_URI` when set.
    fn apply_env_overrides(&mut self) {
        if let Ok(client_id) = std::env::var(ENV_CLIENT_ID)
            && !client_id.is_empty()
        {
            debug!("Client id taken from {ENV_CLIENT_ID}");
            self.client_id = client_id;
        }
        if let Ok(redirect_uri) = std::env::var(ENV_REDIRECT_URI)
            && !redirect_uri.is_empty()
        {
            debug!("Redirect URI taken from {ENV_REDIRECT_URI}");
            self.redirect_uri = redirect_uri;
        }
    }

    /// Require a configured client id, as login initiation does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the client id is empty.
    pub fn require_client_id(&self) -> Result<&str> {
        if self.client_id.is_empty() {
            warn!("Login attempted without a configured client id");
            return Err(Error::Configuration(
                "Streaming client id not configured; set it in the config file or JAMS_CLIENT_ID"
                    .to_string(),
            ));
        }
        Ok(&self.client_id)
    }

    /// Joined scope string as it appears in the authorization URL.
    #[must_use]
    pub fn scope_string() -> String {
        DEFAULT_SCOPES.join(" ")
    }
}

/// Directory where the playback core keeps its config and credentials.
#[must_use]
pub fn data_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("historical-jams")
}

/// Get the path to the config file.
fn config_file_path() -> PathBuf {
    data_directory().join("config.json")
}
