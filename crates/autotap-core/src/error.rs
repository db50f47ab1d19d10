//! Error types shared across AutoTap crates.

use crate::types::ConfigId;

/// Workspace-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum AutoTapError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid click point: {0}")]
    InvalidPoint(String),

    #[error("Configuration not found: {0}")]
    ConfigurationNotFound(ConfigId),

    #[error("Click point not found: {0}")]
    PointNotFound(i64),

    /// The gesture effector cannot perform taps at all (not a single missed tap).
    #[error("Gesture effector unavailable: {0}")]
    Effector(String),

    #[error("Clock error: {0}")]
    Clock(String),

    #[error("Configuration source error: {0}")]
    Source(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Bundle error: {0}")]
    Bundle(String),

    #[error("Unsupported bundle version: {0}")]
    UnsupportedBundleVersion(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AutoTapError {
    /// Whether this error stops only the worker that raised it.
    ///
    /// Every error is worker-fatal; none of them may bring the supervisor down.
    /// Malformed input and effector/clock outages are the expected ones.
    pub fn is_expected_worker_fault(&self) -> bool {
        matches!(
            self,
            AutoTapError::InvalidConfiguration(_)
                | AutoTapError::InvalidPoint(_)
                | AutoTapError::Effector(_)
                | AutoTapError::Clock(_)
                | AutoTapError::Source(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AutoTapError>;
