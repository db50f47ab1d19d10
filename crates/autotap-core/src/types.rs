//! Data model — configurations, click points and the read-only projections
//! the scheduler works from.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PointLimits;
use crate::error::{AutoTapError, Result};

/// Configuration identifier (assigned by storage).
pub type ConfigId = i64;

/// Click point identifier (assigned by storage).
pub type PointId = i64;

/// Time range gating whether a configuration or point may execute.
///
/// Bounds are inclusive. A window never wraps: `start` must be before `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivationWindow {
    /// Fixed pair of instants.
    Absolute {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Time-of-day range (UTC), recurring every day.
    Daily { start: NaiveTime, end: NaiveTime },
}

impl ActivationWindow {
    pub fn absolute(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        ActivationWindow::Absolute { start, end }
    }

    pub fn daily(start: NaiveTime, end: NaiveTime) -> Self {
        ActivationWindow::Daily { start, end }
    }

    /// `start < end`.
    pub fn is_well_formed(&self) -> bool {
        match self {
            ActivationWindow::Absolute { start, end } => start < end,
            ActivationWindow::Daily { start, end } => start < end,
        }
    }

    /// Whether the window opens again every day.
    pub fn is_recurring(&self) -> bool {
        matches!(self, ActivationWindow::Daily { .. })
    }
}

/// A named group of click points with shared timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Unique ID (0 until stored).
    pub id: ConfigId,
    /// Human-readable name.
    pub name: String,
    /// User intent to run.
    pub is_active: bool,
    /// Optional activation window; `None` means always active.
    #[serde(default)]
    pub window: Option<ActivationWindow>,
    /// Number of cycles to run; 0 means infinite.
    #[serde(default)]
    pub repeat_count: u32,
    /// Pause between full cycles.
    #[serde(default)]
    pub global_delay_ms: u64,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

impl Configuration {
    /// Create an inactive, unstored configuration.
    pub fn new(name: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            is_active: false,
            window: None,
            repeat_count: 0,
            global_delay_ms: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_window(mut self, window: ActivationWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_repeat(mut self, repeat_count: u32, global_delay_ms: u64) -> Self {
        self.repeat_count = repeat_count;
        self.global_delay_ms = global_delay_ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AutoTapError::InvalidConfiguration(
                "name must not be blank".into(),
            ));
        }
        if let Some(window) = &self.window {
            if !window.is_well_formed() {
                return Err(AutoTapError::InvalidConfiguration(format!(
                    "'{}': window start must be before end",
                    self.name
                )));
            }
        }
        if i64::try_from(self.global_delay_ms).is_err() {
            return Err(AutoTapError::InvalidConfiguration(format!(
                "'{}': global delay {}ms is too large",
                self.name, self.global_delay_ms
            )));
        }
        Ok(())
    }

    /// Read-only projection handed to the scheduler.
    pub fn snapshot(&self) -> ConfigurationSnapshot {
        ConfigurationSnapshot {
            id: self.id,
            name: self.name.clone(),
            window: self.window,
            repeat_count: self.repeat_count,
            global_delay_ms: self.global_delay_ms,
        }
    }
}

/// One tap target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickPoint {
    /// Unique ID (0 until stored).
    pub id: PointId,
    /// Owning configuration.
    pub configuration_id: ConfigId,
    #[serde(default)]
    pub name: String,
    /// Device-space coordinates.
    pub x: f32,
    pub y: f32,
    /// Visual size hint (dp).
    pub size: f32,
    /// Wait after this point's tap.
    pub delay_ms: u64,
    /// Traversal position, unique within the configuration.
    pub order: u32,
    #[serde(default)]
    pub window: Option<ActivationWindow>,
}

impl ClickPoint {
    /// New point with the default size and delay from `limits`.
    pub fn new(configuration_id: ConfigId, x: f32, y: f32, limits: &PointLimits) -> Self {
        Self {
            id: 0,
            configuration_id,
            name: String::new(),
            x,
            y,
            size: limits.default_size,
            delay_ms: limits.default_delay_ms,
            order: 0,
            window: None,
        }
    }

    pub fn validate(&self, limits: &PointLimits) -> Result<()> {
        let label = if self.name.is_empty() {
            format!("#{}", self.order)
        } else {
            self.name.clone()
        };
        if !(self.x >= 0.0 && self.y >= 0.0) {
            return Err(AutoTapError::InvalidPoint(format!(
                "{label}: coordinates must be non-negative ({}, {})",
                self.x, self.y
            )));
        }
        if !(limits.min_size..=limits.max_size).contains(&self.size) {
            return Err(AutoTapError::InvalidPoint(format!(
                "{label}: size {} outside {}..={}",
                self.size, limits.min_size, limits.max_size
            )));
        }
        if self.delay_ms > limits.max_delay_ms {
            return Err(AutoTapError::InvalidPoint(format!(
                "{label}: delay {}ms exceeds {}ms",
                self.delay_ms, limits.max_delay_ms
            )));
        }
        if let Some(window) = &self.window {
            if !window.is_well_formed() {
                return Err(AutoTapError::InvalidPoint(format!(
                    "{label}: window start must be before end"
                )));
            }
        }
        Ok(())
    }

    pub fn spec(&self) -> PointSpec {
        PointSpec {
            id: self.id,
            x: self.x,
            y: self.y,
            size: self.size,
            delay_ms: self.delay_ms,
            order: self.order,
            window: self.window,
        }
    }
}

/// Validate every point of one configuration, including order uniqueness.
pub fn validate_points(points: &[ClickPoint], limits: &PointLimits) -> Result<()> {
    for point in points {
        point.validate(limits)?;
    }
    ensure_unique_orders(points.iter().map(|p| p.order))
}

/// Fails on the first repeated order value.
pub fn ensure_unique_orders<I>(orders: I) -> Result<()>
where
    I: IntoIterator<Item = u32>,
{
    let mut seen = HashSet::new();
    for order in orders {
        if !seen.insert(order) {
            return Err(AutoTapError::InvalidPoint(format!(
                "duplicate order value {order}"
            )));
        }
    }
    Ok(())
}

/// What the active-set stream reports per configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    pub id: ConfigId,
    pub name: String,
    pub window: Option<ActivationWindow>,
    pub repeat_count: u32,
    pub global_delay_ms: u64,
}

impl ConfigurationSnapshot {
    pub fn global_delay(&self) -> Duration {
        Duration::from_millis(self.global_delay_ms)
    }

    /// `repeat_count == 0`.
    pub fn repeats_forever(&self) -> bool {
        self.repeat_count == 0
    }
}

/// What `points_for` reports per point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSpec {
    pub id: PointId,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub delay_ms: u64,
    pub order: u32,
    pub window: Option<ActivationWindow>,
}

impl PointSpec {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
