//! # AutoTap Core
//!
//! Shared pieces of the AutoTap workspace: configuration, errors, the
//! configuration/click-point data model with its validation rules, and the
//! traits the scheduler uses to reach its collaborators (clock, gesture
//! effector, configuration source).

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::AutoTapConfig;
pub use error::{AutoTapError, Result};
pub use types::{
    ActivationWindow, ClickPoint, ConfigId, Configuration, ConfigurationSnapshot, PointId,
    PointSpec,
};
