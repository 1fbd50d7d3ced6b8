//! Server configuration.
//!
//! Loaded once at startup from a TOML file. Every field has a default, so
//! the server runs without any config file at all.

use std::time::Duration;

use hunt_game::GameError;
use hunt_protocol::{Settings, SettingsPatch};
use hunt_room::RegistryConfig;
use serde::{Deserialize, Serialize};

use crate::HuntError;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "HUNT_CONFIG";
/// Environment variable overriding `server.bind_addr`.
pub const BIND_ENV: &str = "HUNT_BIND";
/// Config file used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "hunt.toml";

/// Full server configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: NetworkConfig,
    pub rooms: RoomsConfig,
    pub logging: LoggingConfig,
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// A connection that sends nothing for this long is dropped and
    /// treated as having left.
    pub idle_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".into(),
            idle_timeout_secs: 300,
        }
    }
}

/// `[rooms]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// How often finished and stale rooms are swept.
    pub cleanup_interval_secs: u64,
    /// Rooms older than this are swept regardless of phase.
    pub retention_secs: u64,
    /// `[rooms.defaults]`: applied on top of the built-in game settings
    /// for every new room, before the host's own overrides.
    pub defaults: SettingsPatch,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 60 * 60,
            retention_secs: 6 * 60 * 60,
            defaults: SettingsPatch::default(),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `hunt_room=debug,info`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ServerConfig {
    /// Loads the config from a TOML file. A missing file yields the
    /// defaults.
    ///
    /// # Errors
    /// `ConfigIo` if the file exists but cannot be read, `ConfigParse`
    /// if it is not valid.
    pub fn load(path: &str) -> Result<Self, HuntError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(path, &text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path, "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(HuntError::ConfigIo {
                path: path.to_owned(),
                source,
            }),
        }
    }

    /// Parses config text. `path` is only used in the error.
    pub fn parse(path: &str, text: &str) -> Result<Self, HuntError> {
        toml::from_str(text).map_err(|source| HuntError::ConfigParse {
            path: path.to_owned(),
            source,
        })
    }

    /// Loads from `$HUNT_CONFIG` (or `hunt.toml`) and applies
    /// `$HUNT_BIND`.
    pub fn from_env() -> Result<Self, HuntError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::load(&path)?;
        if let Ok(addr) = std::env::var(BIND_ENV) {
            config.server.bind_addr = addr;
        }
        Ok(config)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.server.idle_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.rooms.cleanup_interval_secs)
    }

    /// Registry settings derived from `[rooms]`.
    ///
    /// # Errors
    /// `InvalidSettings` if `[rooms.defaults]` produces settings no room
    /// could be created with.
    pub fn registry_config(&self) -> Result<RegistryConfig, HuntError> {
        let default_settings = Settings::default().merged(&self.rooms.defaults);
        default_settings.validate().map_err(GameError::from)?;
        Ok(RegistryConfig {
            default_settings,
            retention: Duration::from_secs(self.rooms.retention_secs),
            ..RegistryConfig::default()
        })
    }
}
