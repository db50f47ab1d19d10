//! AutoTap configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AutoTapError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AutoTapConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub points: PointLimits,
    #[serde(default)]
    pub effector: EffectorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AutoTapConfig {
    /// Load config from the default path (~/.autotap/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AutoTapError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AutoTapError::Config(format!("Failed to parse config: {e}")))?;
        config.points.check()?;
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AutoTapError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the AutoTap home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".autotap")
    }
}

/// Scheduler timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on how long a waiting worker sleeps before re-checking its window.
    #[serde(default = "default_window_poll_ms")]
    pub window_poll_ms: u64,
}

fn default_window_poll_ms() -> u64 { 1000 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            window_poll_ms: default_window_poll_ms(),
        }
    }
}

/// Bounds applied when validating click points (sizes in dp, delays in ms).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointLimits {
    #[serde(default = "default_min_size")]
    pub min_size: f32,
    #[serde(default = "default_max_size")]
    pub max_size: f32,
    #[serde(default = "default_size")]
    pub default_size: f32,
    #[serde(default = "default_delay_ms")]
    pub default_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_min_size() -> f32 { 24.0 }
fn default_max_size() -> f32 { 200.0 }
fn default_size() -> f32 { 48.0 }
fn default_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 60_000 }

impl Default for PointLimits {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            max_size: default_max_size(),
            default_size: default_size(),
            default_delay_ms: default_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl PointLimits {
    /// Reject limits that no point could satisfy.
    pub fn check(&self) -> Result<()> {
        if !(self.min_size > 0.0 && self.min_size <= self.max_size) {
            return Err(AutoTapError::Config(format!(
                "points.min_size ({}) must be positive and not exceed points.max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if !(self.min_size..=self.max_size).contains(&self.default_size) {
            return Err(AutoTapError::Config(format!(
                "points.default_size ({}) outside {}..={}",
                self.default_size, self.min_size, self.max_size
            )));
        }
        if self.default_delay_ms > self.max_delay_ms {
            return Err(AutoTapError::Config(format!(
                "points.default_delay_ms ({}) exceeds points.max_delay_ms ({})",
                self.default_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Which gesture effector performs taps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EffectorKind {
    /// Dry run: log every tap.
    #[default]
    Log,
    /// Spawn an external command per tap.
    Command,
}

/// Gesture effector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectorConfig {
    #[serde(default)]
    pub kind: EffectorKind,
    /// Argv template; `{x}`, `{y}` and `{size}` are substituted per tap.
    #[serde(default = "default_command")]
    pub command: Vec<String>,
    /// How long a tap gesture is held.
    #[serde(default = "default_tap_duration_ms")]
    pub tap_duration_ms: u64,
    /// A tap that does not finish in time is reported as cancelled.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_command() -> Vec<String> {
    vec!["adb", "shell", "input", "tap", "{x}", "{y}"]
        .into_iter().map(String::from).collect()
}
fn default_tap_duration_ms() -> u64 { 100 }
fn default_timeout_ms() -> u64 { 5000 }

impl Default for EffectorConfig {
    fn default() -> Self {
        Self {
            kind: EffectorKind::default(),
            command: default_command(),
            tap_duration_ms: default_tap_duration_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: String,
    /// How often the database-backed source re-reads the active set.
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

fn default_database() -> String { "~/.autotap/autotap.db".into() }
fn default_poll_ms() -> u64 { 1000 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            poll_ms: default_poll_ms(),
        }
    }
}

impl StorageConfig {
    /// Database path with `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database).to_string())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AutoTapConfig::default();
        assert_eq!(config.scheduler.window_poll_ms, 1000);
        assert!((config.points.min_size - 24.0).abs() < f32::EPSILON);
        assert!((config.points.max_size - 200.0).abs() < f32::EPSILON);
        assert_eq!(config.points.max_delay_ms, 60_000);
        assert_eq!(config.effector.kind, EffectorKind::Log);
        assert_eq!(config.effector.tap_duration_ms, 100);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [scheduler]
            window_poll_ms = 250

            [effector]
            kind = "command"
            command = ["input", "tap", "{x}", "{y}"]

            [logging]
            json = true
        "#;

        let config: AutoTapConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.window_poll_ms, 250);
        assert_eq!(config.effector.kind, EffectorKind::Command);
        assert_eq!(config.effector.command.len(), 4);
        assert!(config.logging.json);
        assert_eq!(config.effector.timeout_ms, 5000);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: AutoTapConfig = toml::from_str("").unwrap();
        assert_eq!(config.storage.poll_ms, 1000);
        assert_eq!(config.storage.database, "~/.autotap/autotap.db");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join("autotap-test-config");
        let path = dir.join("config.toml");
        let mut config = AutoTapConfig::default();
        config.scheduler.window_poll_ms = 42;
        config.save_to(&path).unwrap();

        let loaded = AutoTapConfig::load_from(&path).unwrap();
        assert_eq!(loaded.scheduler.window_poll_ms, 42);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_inconsistent_limits_rejected() {
        let limits = PointLimits {
            min_size: 100.0,
            max_size: 50.0,
            ..PointLimits::default()
        };
        assert!(limits.check().is_err());

        let limits = PointLimits {
            default_delay_ms: 90_000,
            ..PointLimits::default()
        };
        assert!(limits.check().is_err());
    }

    #[test]
    fn test_home_dir() {
        let home = AutoTapConfig::home_dir();
        assert!(home.to_string_lossy().contains("autotap"));
    }
}
