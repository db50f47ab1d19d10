//! Test doubles shared by the scheduler's unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autotap_core::error::{AutoTapError, Result};
use autotap_core::traits::{Clock, GestureEffector, TapOutcome, TapRequest};
use autotap_core::{ConfigId, ConfigurationSnapshot, PointId, PointSpec};
use chrono::{DateTime, TimeZone, Utc};

use crate::clock::TokioClock;

/// Fixed start instant for virtual-time tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
}

pub fn point(id: PointId, order: u32, delay_ms: u64) -> PointSpec {
    PointSpec {
        id,
        x: 100.0 + id as f32,
        y: 200.0,
        size: 48.0,
        delay_ms,
        order,
        window: None,
    }
}

pub fn snapshot(id: ConfigId, repeat_count: u32, global_delay_ms: u64) -> ConfigurationSnapshot {
    ConfigurationSnapshot {
        id,
        name: format!("config-{id}"),
        window: None,
        repeat_count,
        global_delay_ms,
    }
}

/// Virtual-time clock whose sleeps of the listed lengths fail.
pub struct OutageClock {
    inner: TokioClock,
    broken: HashSet<Duration>,
}

impl OutageClock {
    pub fn failing_sleeps_of(start: DateTime<Utc>, broken: &[Duration]) -> Self {
        Self {
            inner: TokioClock::starting_at(start),
            broken: broken.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl Clock for OutageClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }

    async fn sleep_for(&self, duration: Duration) -> Result<()> {
        if self.broken.contains(&duration) {
            return Err(AutoTapError::Clock("time source lost".into()));
        }
        self.inner.sleep_for(duration).await
    }
}

#[derive(Debug, Clone)]
pub struct TapRecord {
    pub configuration_id: ConfigId,
    pub point_id: PointId,
    pub at: DateTime<Utc>,
}

/// Effector that records every request with the clock's time.
pub struct RecordingEffector {
    clock: Arc<dyn Clock>,
    taps: Mutex<Vec<TapRecord>>,
    scripted: Mutex<HashMap<PointId, VecDeque<TapOutcome>>>,
    unavailable: HashSet<ConfigId>,
    hold: Duration,
    completed: AtomicUsize,
}

impl RecordingEffector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            taps: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
            unavailable: HashSet::new(),
            hold: Duration::ZERO,
            completed: AtomicUsize::new(0),
        }
    }

    /// Each tap takes `hold` before completing.
    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// Next tap of `point_id` reports `outcome`.
    pub fn script(self, point_id: PointId, outcome: TapOutcome) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(point_id)
            .or_default()
            .push_back(outcome);
        self
    }

    /// Taps for `configuration_id` fail with an effector outage.
    pub fn unavailable_for(mut self, configuration_id: ConfigId) -> Self {
        self.unavailable.insert(configuration_id);
        self
    }

    pub fn records(&self) -> Vec<TapRecord> {
        self.taps.lock().unwrap().clone()
    }

    /// `(point_id, ms since t0)` for one configuration.
    pub fn trace(&self, configuration_id: ConfigId) -> Vec<(PointId, i64)> {
        self.records()
            .into_iter()
            .filter(|r| r.configuration_id == configuration_id)
            .map(|r| (r.point_id, (r.at - t0()).num_milliseconds()))
            .collect()
    }

    pub fn count(&self, configuration_id: ConfigId) -> usize {
        self.records()
            .iter()
            .filter(|r| r.configuration_id == configuration_id)
            .count()
    }

    pub fn total(&self) -> usize {
        self.taps.lock().unwrap().len()
    }

    /// Taps that ran to the end of their hold.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GestureEffector for RecordingEffector {
    fn name(&self) -> &str {
        "recording"
    }

    async fn perform(&self, request: &TapRequest) -> Result<TapOutcome> {
        if self.unavailable.contains(&request.configuration_id) {
            return Err(AutoTapError::Effector("service disconnected".into()));
        }
        self.taps.lock().unwrap().push(TapRecord {
            configuration_id: request.configuration_id,
            point_id: request.point_id,
            at: self.clock.now(),
        });
        if !self.hold.is_zero() {
            self.clock.sleep_for(self.hold).await?;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&request.point_id)
            .and_then(|queue| queue.pop_front());
        Ok(scripted.unwrap_or(TapOutcome::Completed))
    }
}
