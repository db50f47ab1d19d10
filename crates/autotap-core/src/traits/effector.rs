//! Gesture effector trait — performs the physical tap.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ConfigId, PointId};

/// One tap to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapRequest {
    /// Configuration the tap belongs to (for logging and routing).
    pub configuration_id: ConfigId,
    pub point_id: PointId,
    pub x: f32,
    pub y: f32,
    /// Visual size hint.
    pub size: f32,
}

/// How a tap request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapOutcome {
    Completed,
    /// The system interrupted the gesture.
    Cancelled,
    /// The gesture could not be performed this time.
    Failed(String),
}

/// Performs taps on the device.
///
/// At most one request per worker is outstanding at a time. Dropping the
/// future of [`perform`](GestureEffector::perform) abandons the request.
/// An `Err` means the effector is unavailable, not that one tap was missed.
#[async_trait]
pub trait GestureEffector: Send + Sync {
    /// Effector name.
    fn name(&self) -> &str;

    async fn perform(&self, request: &TapRequest) -> Result<TapOutcome>;
}
