//! Tokio-backed clock.
//!
//! Wall time is derived from a fixed anchor plus the tokio monotonic clock, so
//! pausing tokio's time (tests) pauses `now()` too and every sleep advances it
//! deterministically.

use std::time::Duration;

use async_trait::async_trait;
use autotap_core::error::Result;
use autotap_core::traits::Clock;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Clock driven by `tokio::time`.
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor_wall: DateTime<Utc>,
    anchor_instant: Instant,
}

impl TokioClock {
    /// Clock anchored at the current wall time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Clock that reads `start` right now and advances with tokio time.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            anchor_wall: start,
            anchor_instant: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.anchor_instant.elapsed();
        match chrono::Duration::from_std(elapsed) {
            Ok(elapsed) => self.anchor_wall + elapsed,
            Err(_) => DateTime::<Utc>::MAX_UTC,
        }
    }

    async fn sleep_for(&self, duration: Duration) -> Result<()> {
        tokio::time::sleep(duration).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test(start_paused = true)]
    async fn test_now_follows_virtual_time() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let clock = TokioClock::starting_at(start);
        assert_eq!(clock.now(), start);

        clock.sleep_for(Duration::from_millis(1500)).await.unwrap();
        assert_eq!(clock.now(), start + chrono::Duration::milliseconds(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let clock = TokioClock::starting_at(start);
        let deadline = start + chrono::Duration::seconds(10);
        clock.sleep_until(deadline).await.unwrap();
        assert_eq!(clock.now(), deadline);

        // Past deadline returns immediately.
        clock.sleep_until(start).await.unwrap();
        assert_eq!(clock.now(), deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_cancellable() {
        let clock = TokioClock::new();
        let before = clock.now();
        let raced = tokio::time::timeout(
            Duration::from_millis(10),
            clock.sleep_for(Duration::from_secs(60)),
        )
        .await;
        assert!(raced.is_err());
        assert_eq!(clock.now() - before, chrono::Duration::milliseconds(10));
    }
}
