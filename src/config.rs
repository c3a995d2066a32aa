//! Configuration management with validation and defaults
//!
//! Settings come from an optional TOML file, then `STAKEHOUSE_*` environment
//! variables, and are validated before the engine is built.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::errors::{ConfigurationError, WagerResult};

/// Top-level engine configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StakehouseConfig {
    pub economy: EconomyConfig,
    pub crash: CrashConfig,
    pub bonus: BonusConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
}

/// Balance rules shared by every game
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Balance given to an account on first reference and after a reset
    pub default_balance: i64,
    pub max_stake: Option<i64>,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            default_balance: 500,
            max_stake: None,
        }
    }
}

/// Crash round timing
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub tick_interval_ms: u64,
    /// Window after a crash during which a late cash-out gets an explained reject.
    /// Falls back to one tick interval.
    pub grace_period_ms: Option<u64>,
    /// Spawn a ticker task per round. Tests switch this off and drive `tick` by hand.
    pub background_ticks: bool,
    pub settle_retry_ms: u64,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2500,
            grace_period_ms: None,
            background_ticks: true,
            settle_retry_ms: 500,
        }
    }
}

impl CrashConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms.unwrap_or(self.tick_interval_ms))
    }

    pub fn settle_retry(&self) -> Duration {
        Duration::from_millis(self.settle_retry_ms)
    }
}

/// Hourly bonus and wheel of fortune rules
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BonusConfig {
    pub hourly_reward: i64,
    pub hourly_cooldown_secs: i64,
    /// Free wheel spins are spaced by this much; paid spins ignore it
    pub wheel_cooldown_secs: i64,
    pub wheel_paid_cost: i64,
}

impl Default for BonusConfig {
    fn default() -> Self {
        Self {
            hourly_reward: 100,
            hourly_cooldown_secs: 3600,
            wheel_cooldown_secs: 8 * 3600,
            wheel_paid_cost: 100,
        }
    }
}

impl BonusConfig {
    pub fn hourly_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hourly_cooldown_secs)
    }

    pub fn wheel_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.wheel_cooldown_secs)
    }
}

/// Which ledger store backs the engine
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    RocksDb,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

/// Storage configuration with optimization settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub max_write_buffer_number: usize,
    pub compression_type: CompressionType,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_directory: "./DB/ledger_data".to_string(),
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            compression_type: CompressionType::Lz4,
            clear_on_start: false,
        }
    }
}

/// HTTP adapter settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Capacity of the crash event broadcast channel
    pub event_buffer: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            event_buffer: 1024,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Monitoring and logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            log_filter: "stakehouse=info,tower_http=info".to_string(),
        }
    }
}

impl StakehouseConfig {
    /// In-memory store, fast ticks, no background tasks. Used by tests.
    pub fn for_testing() -> Self {
        Self {
            crash: CrashConfig {
                tick_interval_ms: 50,
                grace_period_ms: Some(50),
                background_ticks: false,
                settle_retry_ms: 10,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                clear_on_start: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.economy.default_balance < 0 {
            return Err(invalid(
                "economy.default_balance",
                self.economy.default_balance,
                "Default balance cannot be negative",
            ));
        }
        if let Some(max) = self.economy.max_stake {
            if max <= 0 {
                return Err(invalid("economy.max_stake", max, "Stake limit must be positive"));
            }
        }
        if self.crash.tick_interval_ms == 0 {
            return Err(invalid("crash.tick_interval_ms", 0, "Tick interval cannot be zero"));
        }
        if self.crash.settle_retry_ms == 0 {
            return Err(invalid("crash.settle_retry_ms", 0, "Retry delay cannot be zero"));
        }
        if self.bonus.hourly_reward <= 0 {
            return Err(invalid("bonus.hourly_reward", self.bonus.hourly_reward, "Reward must be positive"));
        }
        if self.bonus.wheel_paid_cost <= 0 {
            return Err(invalid("bonus.wheel_paid_cost", self.bonus.wheel_paid_cost, "Spin cost must be positive"));
        }
        if self.bonus.hourly_cooldown_secs < 0 || self.bonus.wheel_cooldown_secs < 0 {
            return Err(ConfigurationError::ValidationFailed(
                "bonus cooldowns cannot be negative".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::RocksDb && self.storage.data_directory.is_empty() {
            return Err(ConfigurationError::ValidationFailed(
                "storage.data_directory is required for the rocksdb backend".to_string(),
            ));
        }
        if self.api.port == 0 {
            return Err(invalid("api.port", 0, "Port cannot be zero"));
        }
        if self.api.event_buffer == 0 {
            return Err(invalid("api.event_buffer", 0, "Event buffer cannot be zero"));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: String, reason: &str) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: name.to_string(),
        value,
        reason: reason.to_string(),
    })
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> WagerResult<StakehouseConfig> {
        let mut config = match self.config_path {
            Some(ref path) if Path::new(path).exists() => self.load_from_file(path)?,
            Some(ref path) => {
                tracing::warn!(path = %path, "config file not found, using defaults");
                StakehouseConfig::default()
            }
            None => StakehouseConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> WagerResult<StakehouseConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut StakehouseConfig) -> Result<(), ConfigurationError> {
        if let Ok(host) = env::var("STAKEHOUSE_API_HOST") {
            config.api.host = host;
        }
        if let Ok(port) = env::var("STAKEHOUSE_API_PORT") {
            config.api.port = parse_env("STAKEHOUSE_API_PORT", port, "Invalid port number")?;
        }
        if let Ok(dir) = env::var("STAKEHOUSE_DATA_DIR") {
            config.storage.data_directory = dir;
        }
        if let Ok(backend) = env::var("STAKEHOUSE_STORAGE_BACKEND") {
            config.storage.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "rocksdb" => StorageBackend::RocksDb,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        field: "STAKEHOUSE_STORAGE_BACKEND".to_string(),
                        value: backend,
                        reason: "Expected memory or rocksdb".to_string(),
                    })
                }
            };
        }
        if let Ok(balance) = env::var("STAKEHOUSE_DEFAULT_BALANCE") {
            config.economy.default_balance =
                parse_env("STAKEHOUSE_DEFAULT_BALANCE", balance, "Invalid balance")?;
        }
        if let Ok(tick) = env::var("STAKEHOUSE_CRASH_TICK_MS") {
            config.crash.tick_interval_ms = parse_env("STAKEHOUSE_CRASH_TICK_MS", tick, "Invalid interval")?;
        }
        if let Ok(filter) = env::var("STAKEHOUSE_LOG") {
            config.monitoring.log_filter = filter;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &StakehouseConfig, path: &str) -> WagerResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}
