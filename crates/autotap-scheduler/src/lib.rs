//! # AutoTap Scheduler
//!
//! Runs tap-automation configurations concurrently: one worker per active
//! configuration, each walking its click points in order with per-point and
//! per-cycle delays, gated by activation windows.
//!
//! ## Design Principles
//! - One tokio task per active configuration, nothing shared between workers
//! - Cancellation tokens at every suspension point
//! - SQLite persistence, polled for changes
//! - Worker failures never reach the supervisor
//!
//! ## Architecture
//! ```text
//! ConfigurationSource (DbSource / MemorySource)
//!   └── active set stream ──► SchedulerSupervisor (reconcile)
//!                               ├── Worker: "Daily login"   ──┐
//!                               ├── Worker: "Farm loop"     ──┼──► GestureEffector
//!                               └── Worker: "Night collect" ──┘    (log / command)
//!
//! Worker: Idle → Waiting → Active ⇄ Sleeping → Stopped
//!   ├── activation window (absolute / daily)
//!   ├── points in ascending order, delay after each
//!   └── repeat N cycles (0 = forever) with a global delay between cycles
//! ```

pub mod bundle;
pub mod clock;
pub mod db_source;
pub mod effector;
pub mod persistence;
pub mod source;
pub mod supervisor;
pub mod window;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use bundle::{ConfigurationBundle, export_bundle, export_file_name, import_bundle};
pub use clock::TokioClock;
pub use db_source::DbSource;
pub use effector::{CommandEffector, LogEffector, build_effector};
pub use persistence::ConfigDb;
pub use source::MemorySource;
pub use supervisor::SchedulerSupervisor;
pub use window::WindowStatus;
pub use worker::{ConfigurationWorker, WorkerExit, WorkerPhase, WorkerState};
