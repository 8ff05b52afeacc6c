//! TOML-based engine configuration.
//!
//! Stores:
//! - Activity detection (inactivity threshold, sweep cadence)
//! - Accrual (tick interval, coins per tick)
//! - Ledger endpoint settings (the API key lives in the OS keyring)
//!
//! Configuration is stored at `~/.config/coinroom/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::data_dir;
use crate::error::ConfigError;
use crate::session::MAX_INTERVAL_SECS;

/// Activity monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "default_inactivity_threshold")]
    pub inactivity_threshold_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Accrual timer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualConfig {
    #[serde(default = "default_accrual_interval")]
    pub interval_secs: u64,
    /// Coins requested per tick.
    #[serde(default = "default_amount")]
    pub amount: u64,
}

/// Hosted ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Project URL of the hosted backend. Empty means "not configured".
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_grant_function")]
    pub grant_function: String,
    #[serde(default = "default_profiles_table")]
    pub profiles_table: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/coinroom/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub accrual: AccrualConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

// Default functions
fn default_inactivity_threshold() -> u64 {
    120
}
fn default_sweep_interval() -> u64 {
    30
}
fn default_accrual_interval() -> u64 {
    60
}
fn default_amount() -> u64 {
    1
}
fn default_grant_function() -> String {
    "add_coins".into()
}
fn default_profiles_table() -> String {
    "profiles".into()
}
fn default_timeout() -> u64 {
    10
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_secs: default_inactivity_threshold(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_accrual_interval(),
            amount: default_amount(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            grant_function: default_grant_function(),
            profiles_table: default_profiles_table(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?,
                    serde_json::Value::Bool(_) => value
                        .parse::<bool>()
                        .map(serde_json::Value::Bool)
                        .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("key names a section, not a value".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Path of the config file inside the data directory.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default path, writing defaults if the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed or fails
    /// validation, or if the default config cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Set a value by key in memory, type-checked against the current value
    /// and validated as a whole.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a value by key and persist to the default path.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_value(key, value)?;
        self.save()
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("activity.inactivity_threshold_secs", self.activity.inactivity_threshold_secs),
            ("activity.sweep_interval_secs", self.activity.sweep_interval_secs),
            ("accrual.interval_secs", self.accrual.interval_secs),
        ] {
            if value == 0 || value > MAX_INTERVAL_SECS {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be between 1 and {MAX_INTERVAL_SECS} seconds"),
                });
            }
        }
        if self.accrual.amount == 0 || self.accrual.amount > i64::MAX as u64 {
            return Err(ConfigError::InvalidValue {
                key: "accrual.amount".into(),
                message: "must be a positive number of coins".into(),
            });
        }
        if self.ledger.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ledger.timeout_secs".into(),
                message: "must be greater than zero".into(),
            });
        }
        if !self.ledger.base_url.is_empty() {
            url::Url::parse(&self.ledger.base_url).map_err(|e| ConfigError::InvalidValue {
                key: "ledger.base_url".into(),
                message: e.to_string(),
            })?;
        }
        if self.activity.sweep_interval_secs > self.activity.inactivity_threshold_secs {
            warn!(
                sweep = self.activity.sweep_interval_secs,
                threshold = self.activity.inactivity_threshold_secs,
                "sweep interval exceeds inactivity threshold; idle detection will lag"
            );
        }
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
