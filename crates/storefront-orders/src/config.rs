//! # Storefront Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     STOREFRONT_DB_PATH=/var/lib/storefront/storefront.db                │
//! │     STOREFRONT_RESTOCK_DELAY_SECS=86400                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/storefront/storefront.toml (Linux)                        │
//! │     ~/Library/Application Support/com.storefront.storefront/ (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/storefront/storefront.db"
//! max_connections = 5
//!
//! [checkout]
//! shipping_cents = 1000
//!
//! [returns]
//! window_days = 30
//! restock_delay_secs = 30
//!
//! [worker]
//! poll_interval_secs = 5
//! batch_size = 50
//! max_attempts = 5
//! retry_delay_secs = 60
//! stale_order_secs = 300
//!
//! [guest_cart]
//! path = "/home/me/.local/share/storefront/guest_cart.json"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use storefront_core::{DEFAULT_SHIPPING_CENTS, RETURN_WINDOW_DAYS};
use storefront_db::DbConfig;

// =============================================================================
// Config Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No config directory available on this platform")]
    NoConfigDir,
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on SQLite's lock (seconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("storefront.db"))
        .unwrap_or_else(|| PathBuf::from("storefront.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

impl DatabaseSettings {
    /// Pool configuration for [`storefront_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        if self.path.as_os_str() == ":memory:" {
            return DbConfig::in_memory();
        }

        DbConfig::new(&self.path)
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_secs(self.busy_timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSettings {
    /// Flat shipping added to every order.
    #[serde(default = "default_shipping")]
    pub shipping_cents: i64,
}

fn default_shipping() -> i64 {
    DEFAULT_SHIPPING_CENTS
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        CheckoutSettings {
            shipping_cents: default_shipping(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnSettings {
    /// Days after the order date during which returns are accepted.
    #[serde(default = "default_window_days")]
    pub window_days: i64,

    /// Inspection delay between approval and the stock coming back.
    #[serde(default = "default_restock_delay")]
    pub restock_delay_secs: u64,
}

fn default_window_days() -> i64 {
    RETURN_WINDOW_DAYS
}

fn default_restock_delay() -> u64 {
    30
}

impl Default for ReturnSettings {
    fn default() -> Self {
        ReturnSettings {
            window_days: default_window_days(),
            restock_delay_secs: default_restock_delay(),
        }
    }
}

impl ReturnSettings {
    pub fn restock_delay(&self) -> Duration {
        Duration::from_secs(self.restock_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Tasks picked up per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// A task is parked after this many failed attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// A `pending` order older than this is treated as interrupted.
    #[serde(default = "default_stale_order")]
    pub stale_order_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_batch_size() -> u32 {
    50
}
fn default_max_attempts() -> i64 {
    5
}
fn default_retry_delay() -> u64 {
    60
}
fn default_stale_order() -> u64 {
    300
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            stale_order_secs: default_stale_order(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuestCartSettings {
    /// JSON file holding the guest cart. Defaults to the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl GuestCartSettings {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|dirs| dirs.data_dir().join("guest_cart.json"))
                .unwrap_or_else(|| PathBuf::from("guest_cart.json"))
        })
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete storefront configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorefrontConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub checkout: CheckoutSettings,

    #[serde(default)]
    pub returns: ReturnSettings,

    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub guest_cart: GuestCartSettings,
}

impl StorefrontConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (storefront.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading storefront config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load storefront config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Storefront config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be greater than 0".into()));
        }
        if self.checkout.shipping_cents < 0 {
            return Err(ConfigError::Invalid("checkout.shipping_cents must not be negative".into()));
        }
        if self.returns.window_days < 0 {
            return Err(ConfigError::Invalid("returns.window_days must not be negative".into()));
        }
        if self.worker.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("worker.poll_interval_secs must be greater than 0".into()));
        }
        if self.worker.batch_size == 0 {
            return Err(ConfigError::Invalid("worker.batch_size must be greater than 0".into()));
        }
        if self.worker.max_attempts <= 0 {
            return Err(ConfigError::Invalid("worker.max_attempts must be greater than 0".into()));
        }

        Ok(())
    }

    /// Applies `STOREFRONT_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("STOREFRONT_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        parse_into(&lookup, "STOREFRONT_DB_MAX_CONNECTIONS", &mut self.database.max_connections);
        parse_into(&lookup, "STOREFRONT_SHIPPING_CENTS", &mut self.checkout.shipping_cents);
        parse_into(&lookup, "STOREFRONT_RETURN_WINDOW_DAYS", &mut self.returns.window_days);
        parse_into(&lookup, "STOREFRONT_RESTOCK_DELAY_SECS", &mut self.returns.restock_delay_secs);
        parse_into(&lookup, "STOREFRONT_WORKER_POLL_SECS", &mut self.worker.poll_interval_secs);
        parse_into(&lookup, "STOREFRONT_WORKER_BATCH_SIZE", &mut self.worker.batch_size);
        parse_into(&lookup, "STOREFRONT_WORKER_MAX_ATTEMPTS", &mut self.worker.max_attempts);

        if let Some(path) = lookup("STOREFRONT_GUEST_CART_PATH") {
            self.guest_cart.path = Some(PathBuf::from(path));
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("storefront.toml"))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "storefront", "storefront")
}

fn parse_into<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "Ignoring unparsable environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = StorefrontConfig::default();
        assert_eq!(config.checkout.shipping_cents, 1000);
        assert_eq!(config.returns.window_days, 30);
        assert_eq!(config.returns.restock_delay(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: StorefrontConfig = toml::from_str(
            r#"
            [returns]
            restock_delay_secs = 86400

            [database]
            path = ":memory:"
            "#,
        )
        .unwrap();

        assert_eq!(config.returns.restock_delay_secs, 86400);
        assert_eq!(config.returns.window_days, 30);
        assert_eq!(config.worker.batch_size, 50);
        assert!(config.database.db_config().is_in_memory());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("STOREFRONT_SHIPPING_CENTS", "499"),
            ("STOREFRONT_RESTOCK_DELAY_SECS", "3600"),
            ("STOREFRONT_WORKER_BATCH_SIZE", "not-a-number"),
            ("STOREFRONT_GUEST_CART_PATH", "/tmp/cart.json"),
        ]
        .into_iter()
        .collect();

        let mut config = StorefrontConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.checkout.shipping_cents, 499);
        assert_eq!(config.returns.restock_delay_secs, 3600);
        assert_eq!(config.worker.batch_size, 50);
        assert_eq!(config.guest_cart.resolved_path(), PathBuf::from("/tmp/cart.json"));
    }

    #[test]
    fn test_validation() {
        let mut config = StorefrontConfig::default();
        config.checkout.shipping_cents = -1;
        assert!(config.validate().is_err());

        config.checkout.shipping_cents = 0;
        config.worker.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_and_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storefront.toml");

        let mut config = StorefrontConfig::default();
        config.returns.window_days = 14;
        config.save(Some(path.clone())).unwrap();

        let loaded = StorefrontConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.returns.window_days, 14);
    }
}
