//! Configuration management for SARVIS clients
//!
//! Config files are stored in platform-appropriate locations:
//! - Linux: ~/.config/sarvis/
//! - macOS: ~/Library/Application Support/sarvis/
//! - Windows: %APPDATA%\sarvis\

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Shortest period any timer is driven at; `tokio::time::interval` rejects zero
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    NoDirFound,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend (REST + WebSocket) server
    #[serde(default)]
    pub backend: BackendConfig,

    /// Robot onboard computer reached over SoftAP
    #[serde(default)]
    pub device: DeviceConfig,

    /// Push channel behaviour
    #[serde(default)]
    pub websocket: WebSocketConfig,

    /// Client-side preferences
    #[serde(default)]
    pub client: ClientConfig,
}

/// Backend server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL, e.g. http://host:8080
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Default request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Timeout for the email code request (mail delivery is slow)
    #[serde(default = "default_email_timeout")]
    pub email_timeout_secs: u64,

    /// Timeout for the email code verification step
    #[serde(default = "default_email_verify_timeout")]
    pub email_verify_timeout_secs: u64,
}

/// Jetson link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_jetson_host")]
    pub host: String,

    #[serde(default = "default_jetson_port")]
    pub port: u16,

    /// Reachability probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Multipart upload timeout in seconds
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,

    /// Interval between reachability probes while waiting for the device
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Give up waiting for the device after this many seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

/// WebSocket push channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_max_reconnects")]
    pub max_reconnect_attempts: u32,

    /// Delay before the foreground status returns to idle after a command
    #[serde(default = "default_status_reset")]
    pub status_reset_secs: u64,
}

/// Client-side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Override for the local data directory (storage.json lives here)
    pub storage_dir: Option<PathBuf>,

    /// Voice overlay auto-dismiss delay in seconds
    #[serde(default = "default_overlay_dismiss")]
    pub overlay_dismiss_secs: u64,

    /// Vibration length on a wake-word call, in milliseconds
    #[serde(default = "default_vibration")]
    pub vibration_ms: u64,

    /// TUI-specific settings
    #[serde(default)]
    pub tui: TuiConfig,
}

/// TUI-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuiConfig {
    /// Use true color (24-bit)
    #[serde(default = "default_true")]
    pub true_color: bool,

    /// Enable mouse support
    #[serde(default)]
    pub mouse: bool,

    /// Captured image sent to the Jetson for face login
    pub face_image: Option<PathBuf>,
}

// Default value functions
fn default_backend_url() -> String {
    crate::DEFAULT_BACKEND_URL.to_string()
}
fn default_timeout() -> u64 {
    crate::DEFAULT_TIMEOUT_SECS
}
fn default_email_timeout() -> u64 {
    60
}
fn default_email_verify_timeout() -> u64 {
    10
}
fn default_jetson_host() -> String {
    crate::DEFAULT_JETSON_HOST.to_string()
}
fn default_jetson_port() -> u16 {
    crate::DEFAULT_JETSON_PORT
}
fn default_probe_timeout() -> u64 {
    5
}
fn default_upload_timeout() -> u64 {
    60
}
fn default_poll_interval() -> u64 {
    3
}
fn default_poll_timeout() -> u64 {
    30
}
fn default_heartbeat() -> u64 {
    30
}
fn default_reconnect_delay() -> u64 {
    3
}
fn default_max_reconnects() -> u32 {
    9999 // effectively unbounded; keeps the channel alive in the background
}
fn default_status_reset() -> u64 {
    2
}
fn default_overlay_dismiss() -> u64 {
    3
}
fn default_vibration() -> u64 {
    100
}
fn default_true() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_secs: default_timeout(),
            email_timeout_secs: default_email_timeout(),
            email_verify_timeout_secs: default_email_verify_timeout(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_jetson_host(),
            port: default_jetson_port(),
            probe_timeout_secs: default_probe_timeout(),
            upload_timeout_secs: default_upload_timeout(),
            poll_interval_secs: default_poll_interval(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat(),
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnects(),
            status_reset_secs: default_status_reset(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            overlay_dismiss_secs: default_overlay_dismiss(),
            vibration_ms: default_vibration(),
            tui: TuiConfig::default(),
        }
    }
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self {
            true_color: true,
            mouse: false,
            face_image: None,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DeviceConfig {
    /// Base URL of the Jetson HTTP service
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs).max(MIN_PERIOD)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

impl WebSocketConfig {
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs).max(MIN_PERIOD)
    }
}

impl Config {
    /// Get config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("sarvis"))
            .ok_or(ConfigError::NoDirFound)
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Directory holding local client state
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.client.storage_dir {
            return Ok(dir.clone());
        }
        dirs::data_local_dir()
            .map(|p| p.join("sarvis"))
            .ok_or(ConfigError::NoDirFound)
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config from specific path
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
