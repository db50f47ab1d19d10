//! Clock trait — time source for the scheduler.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Supplies the current instant and cancellable waits.
///
/// Waits are cancelled by dropping the returned future.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock instant.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend for `duration`. An error means the time source is gone.
    async fn sleep_for(&self, duration: Duration) -> Result<()>;

    /// Suspend until `deadline`. Returns immediately if it already passed.
    async fn sleep_until(&self, deadline: DateTime<Utc>) -> Result<()> {
        let remaining = deadline - self.now();
        match remaining.to_std() {
            Ok(remaining) => self.sleep_for(remaining).await,
            Err(_) => Ok(()),
        }
    }
}
