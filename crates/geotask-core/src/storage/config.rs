//! TOML-based application configuration.
//!
//! Stores:
//! - Arbitration policy (snooze, margin, escalation band, switch timeout)
//! - Owner-loop tuning (tick interval, command queue capacity)
//! - Logging filter
//! - Optional database location
//!
//! Configuration is stored at `~/.config/geotask/config.toml`.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::arbitration::ArbitrationPolicy;
use crate::error::ConfigError;

/// Scheduler section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_snooze_secs")]
    pub default_snooze_secs: u64,
    #[serde(default)]
    pub preemption_margin: u32,
    #[serde(default)]
    pub escalation_band: u32,
    #[serde(default = "default_true")]
    pub escalate_ties: bool,
    /// Falls back to the snooze duration when unset.
    #[serde(default)]
    pub switch_timeout_secs: Option<u64>,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,
}

/// Logging section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `tracing_subscriber::EnvFilter` directive, overridden by GEOTASK_LOG.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/geotask/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Database location; defaults to `geotask.db` in the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

// Default functions
fn default_snooze_secs() -> u64 {
    600
}
fn default_true() -> bool {
    true
}
fn default_tick_interval_ms() -> u64 {
    1_000
}
fn default_command_queue_capacity() -> usize {
    64
}
fn default_log_filter() -> String {
    "warn".into()
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            default_snooze_secs: default_snooze_secs(),
            preemption_margin: 0,
            escalation_band: 0,
            escalate_ties: true,
            switch_timeout_secs: None,
            tick_interval_ms: default_tick_interval_ms(),
            command_queue_capacity: default_command_queue_capacity(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSection::default(),
            logging: LoggingSection::default(),
            database_path: None,
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
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    _ if value.eq_ignore_ascii_case("none") => serde_json::Value::Null,
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    // unset optional: numbers stay numbers
                    serde_json::Value::Null => match value.parse::<u64>() {
                        Ok(n) => serde_json::Value::Number(n.into()),
                        Err(_) => serde_json::Value::String(value.into()),
                    },
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
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

    /// Default config file location.
    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::DataDir(e.to_string()))
    }

    /// Load from the default location, writing defaults if the file is missing.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
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

    /// Persist to the default location.
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
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key without saving.
    ///
    /// Fails if the key is unknown or the value does not fit the field.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        // optional fields missing from the JSON tree are still settable
        if key == "database_path" && json.get("database_path").is_none() {
            if let Some(obj) = json.as_object_mut() {
                obj.insert("database_path".into(), serde_json::Value::Null);
            }
        }
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.scheduler_config()?;
        *self = updated;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Validated runtime form of the scheduler section.
    pub fn scheduler_config(&self) -> Result<SchedulerConfig, ConfigError> {
        let s = &self.scheduler;
        if s.default_snooze_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.default_snooze_secs".into(),
                message: "must be at least one second".into(),
            });
        }
        if s.switch_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.switch_timeout_secs".into(),
                message: "must be at least one second".into(),
            });
        }
        if s.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.tick_interval_ms".into(),
                message: "must be positive".into(),
            });
        }
        let snooze = Duration::seconds(secs_i64(s.default_snooze_secs));
        Ok(SchedulerConfig {
            policy: ArbitrationPolicy {
                preemption_margin: s.preemption_margin,
                escalation_band: s.escalation_band,
                escalate_ties: s.escalate_ties,
                default_snooze: snooze,
            },
            switch_timeout: s
                .switch_timeout_secs
                .map(|secs| Duration::seconds(secs_i64(secs)))
                .unwrap_or(snooze),
            tick_interval: std::time::Duration::from_millis(s.tick_interval_ms),
            command_queue_capacity: s.command_queue_capacity.max(1),
        })
    }
}

fn secs_i64(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX / 1_000)
}

/// Runtime scheduler settings derived from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub policy: ArbitrationPolicy,
    /// How long a switch request may stay unanswered.
    pub switch_timeout: Duration,
    /// Pending-expiry check period of the owner loop.
    pub tick_interval: std::time::Duration,
    pub command_queue_capacity: usize,
}

impl SchedulerConfig {
    pub fn default_snooze(&self) -> Duration {
        self.policy.default_snooze
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let policy = ArbitrationPolicy::default();
        Self {
            switch_timeout: policy.default_snooze,
            policy,
            tick_interval: std::time::Duration::from_millis(default_tick_interval_ms()),
            command_queue_capacity: default_command_queue_capacity(),
        }
    }
}
