//! Bridge configuration.
//!
//! Aggregates broker, channel, transfer and IPC settings into a single Config
//! struct that can be loaded from YAML files or environment variables.

use serde::Deserialize;

use crate::bus::AckLevel;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "bridge.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "BRIDGE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "BRIDGE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "BRIDGE_LOG";

/// Default maximum chunk payload size (100 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 100 * 1024;

/// Main bridge configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection settings.
    pub broker: BrokerConfig,
    /// Broker channel (topic) names.
    pub channels: ChannelConfig,
    /// Chunked transfer settings.
    pub transfer: TransferConfig,
    /// Local listener settings.
    pub ipc: IpcConfig,
}

/// Broker connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name or IP address.
    pub address: String,
    /// Broker port.
    pub port: u16,
    /// Prefix for the generated client id (`<prefix>_<uuid>`).
    pub client_id_prefix: String,
    /// Optional username.
    pub username: Option<String>,
    /// Optional password (only used together with `username`).
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u64,
    /// Time allowed for the initial connection handshake.
    pub connect_timeout_secs: u64,
    /// Startup connection retries (0 = fail on first error).
    pub connect_retries: usize,
    /// Time allowed for a single publish to be acknowledged.
    pub publish_timeout_secs: u64,
    /// Requested acknowledgment level for every publish.
    pub ack_level: AckLevel,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: "broker.hivemq.com".to_string(),
            port: 1883,
            client_id_prefix: "bridge".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 60,
            connect_timeout_secs: 10,
            connect_retries: 0,
            publish_timeout_secs: 30,
            ack_level: AckLevel::AtLeastOnce,
        }
    }
}

impl BrokerConfig {
    /// Get the `host:port` string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Username/password pair, if both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

/// Broker channel names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel carrying chunk frames.
    pub binary: String,
    /// Channel carrying telemetry JSON.
    pub json: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            binary: "binaryChunks".to_string(),
            json: "telemetry/data".to_string(),
        }
    }
}

/// Chunked transfer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum payload bytes per chunk frame.
    pub chunk_size_bytes: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Local listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Address to listen on.
    pub address: String,
    /// Shared secret producers must prove knowledge of.
    pub authkey: String,
    /// Time allowed for a connecting producer to complete authentication.
    pub handshake_timeout_secs: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6000".to_string(),
            authkey: "secret".to_string(),
            handshake_timeout_secs: 5,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `bridge.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer.chunk_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "transfer.chunk_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.channels.binary.is_empty() || self.channels.json.is_empty() {
            return Err(ConfigError::Invalid(
                "channels.binary and channels.json must be non-empty".to_string(),
            ));
        }
        if self.ipc.authkey.is_empty() {
            return Err(ConfigError::Invalid("ipc.authkey must be non-empty".to_string()));
        }
        if self.ipc.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "ipc.handshake_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.broker.publish_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "broker.publish_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
