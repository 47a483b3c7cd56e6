//! Application configuration management.
//!
//! Handles loading, saving, and accessing client configuration: the lending
//! server base URL, realtime connection tuning, and logging preferences.
//! Configuration is persisted as TOML on disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants;
use crate::error::{KitError, KitResult};
use crate::platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Lending server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Realtime channel tuning.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Lending server base URL (e.g., "https://lend.example.edu").
    #[serde(default)]
    pub base_url: String,
}

/// Realtime connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Outgoing heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_outgoing_ms: u64,

    /// Expected incoming heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_incoming_ms: u64,

    /// Fixed delay between reconnection attempts in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses the default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output for the file layer.
    #[serde(default)]
    pub json_output: bool,
}

fn default_heartbeat_ms() -> u64 {
    constants::HEARTBEAT_MS
}

fn default_reconnect_delay_ms() -> u64 {
    constants::RECONNECT_DELAY_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            realtime: RealtimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_outgoing_ms: default_heartbeat_ms(),
            heartbeat_incoming_ms: default_heartbeat_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> KitResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> KitResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> KitResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| KitError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> KitResult<PathBuf> {
        let data_dir = platform::data_dir()?;
        Ok(data_dir.join("config.toml"))
    }

    /// Check whether the server connection is configured.
    pub fn is_server_configured(&self) -> bool {
        !self.server.base_url.is_empty()
    }

    /// Sanitize and normalize a server base URL.
    ///
    /// Ensures the URL has a scheme and strips trailing slashes.
    pub fn sanitize_base_url(url: &str) -> String {
        let trimmed = url.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

impl ServerConfig {
    /// Build the realtime endpoint URL from the base URL.
    ///
    /// Rewrites the http(s) scheme to ws(s) and appends the SockJS mount path
    /// plus the raw-WebSocket transport suffix:
    /// `https://host` becomes `wss://host/ws/websocket`.
    pub fn ws_url(&self) -> KitResult<String> {
        if self.base_url.is_empty() {
            return Err(KitError::MissingConfig("server.base_url".into()));
        }
        let base = AppConfig::sanitize_base_url(&self.base_url);
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(KitError::Config(format!("unsupported base url: {base}")));
        };
        Ok(format!(
            "{ws_base}{}{}",
            constants::WS_MOUNT_PATH,
            constants::WS_RAW_SUFFIX
        ))
    }
}
