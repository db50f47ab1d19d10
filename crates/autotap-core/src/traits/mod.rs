//! Seams between the scheduler and its collaborators.

pub mod clock;
pub mod effector;
pub mod source;

pub use clock::Clock;
pub use effector::{GestureEffector, TapOutcome, TapRequest};
pub use source::ConfigurationSource;
