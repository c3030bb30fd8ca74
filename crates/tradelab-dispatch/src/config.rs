//! Configuration loading and typed config structures for the exchange server.
//!
//! The canonical configuration lives in `tradelab-config.yaml` in the working
//! directory. Every section and field has a default, so a partial file (or no
//! file at all) yields a usable configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tradelab_store::MAX_SESSION_TTL_SECS;
use tradelab_types::{ExchangeFormat, SessionFormat};

use crate::retry::RetryPolicy;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level exchange configuration.
///
/// Mirrors the structure of `tradelab-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExchangeConfig {
    /// Session design and matching mechanism.
    #[serde(default)]
    pub session: SessionConfig,

    /// Store connection and session expiry.
    #[serde(default)]
    pub store: StoreConfig,

    /// Compare-and-swap retry budget.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Checkpoint output.
    #[serde(default)]
    pub checkpoints: CheckpointConfig,

    /// Fan-out behavior.
    #[serde(default)]
    pub fanout: FanoutConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Entities to create before serving events.
    #[serde(default)]
    pub setup: SetupConfig,
}

impl ExchangeConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `DRAGONFLY_URL` overrides `store.dragonfly_url`
    /// - `TRADELAB_CHECKPOINT_PATH` overrides `checkpoints.path`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override connection settings with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.store.dragonfly_url = val;
        }
        if let Ok(val) = std::env::var("TRADELAB_CHECKPOINT_PATH") {
            self.checkpoints.path = PathBuf::from(val);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_owned(),
            });
        }
        if !(1..=MAX_SESSION_TTL_SECS).contains(&self.store.session_ttl_secs) {
            return Err(ConfigError::Invalid {
                field: "store.session_ttl_secs",
                reason: format!(
                    "{} is outside 1..={MAX_SESSION_TTL_SECS}",
                    self.store.session_ttl_secs
                ),
            });
        }
        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid {
                field: "retry.base_backoff_ms",
                reason: format!(
                    "{} exceeds max_backoff_ms {}",
                    self.retry.base_backoff_ms, self.retry.max_backoff_ms
                ),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Session design and matching mechanism. Together they select the trader
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Session design (`BCS` or `ELO`).
    #[serde(default = "default_session_format")]
    pub session_format: SessionFormat,

    /// Matching mechanism (`CDA` or `FBA`).
    #[serde(default = "default_exchange_format")]
    pub exchange_format: ExchangeFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_format: default_session_format(),
            exchange_format: default_exchange_format(),
        }
    }
}

/// Store connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Dragonfly (Redis-compatible) URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,

    /// Expiry of session objects, in seconds. Must lie in
    /// `1..=`[`MAX_SESSION_TTL_SECS`].
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl StoreConfig {
    /// Session expiry as a [`Duration`].
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dragonfly_url: default_dragonfly_url(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

/// Retry budget for the compare-and-swap loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Attempts before giving up with `RetriesExhausted`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff ceiling, in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Upper bound of any single backoff, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl RetryConfig {
    /// The runtime retry policy for these settings.
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Checkpoint output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckpointConfig {
    /// Whether checkpoints are written at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// JSON-lines file checkpoints are appended to.
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_checkpoint_path(),
        }
    }
}

/// Fan-out settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct FanoutConfig {
    /// Seed for the outgoing-message shuffle. Unset means seeded from the OS.
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Entities created before the server starts reading events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SetupConfig {
    /// Markets to create.
    #[serde(default)]
    pub markets: Vec<MarketSetup>,

    /// Traders to create and register with their market.
    #[serde(default)]
    pub traders: Vec<TraderSetup>,

    /// Trade sessions to create.
    #[serde(default)]
    pub sessions: Vec<SessionSetup>,
}

/// One market to create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarketSetup {
    /// Market id.
    pub id: u64,
    /// Opening fundamental price, in ticks.
    #[serde(default = "default_fundamental_price")]
    pub fundamental_price: i64,
}

/// One trader to create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TraderSetup {
    /// Trader id. Must not be 0, which is reserved for the investor.
    pub id: u64,
    /// Market the trader joins.
    pub market_id: u64,
    /// Starting role name.
    #[serde(default = "default_role")]
    pub role: String,
}

/// One trade session to create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionSetup {
    /// Subsession id.
    pub id: u64,
    /// Markets taking part.
    pub markets: Vec<u64>,
}

// =============================================================================
// Default value functions
// =============================================================================

const fn default_session_format() -> SessionFormat {
    SessionFormat::Bcs
}

const fn default_exchange_format() -> ExchangeFormat {
    ExchangeFormat::Cda
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

const fn default_session_ttl_secs() -> u64 {
    3600
}

const fn default_max_attempts() -> u32 {
    64
}

const fn default_base_backoff_ms() -> u64 {
    1
}

const fn default_max_backoff_ms() -> u64 {
    50
}

const fn default_true() -> bool {
    true
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("checkpoints.jsonl")
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_fundamental_price() -> i64 {
    100
}

fn default_role() -> String {
    "out".to_owned()
}
