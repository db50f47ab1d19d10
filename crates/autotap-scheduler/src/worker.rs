//! Configuration worker — executes one configuration's point sequence.
//!
//! ```text
//! Idle ──► Waiting ──► Active ◄──► Sleeping
//!   │         │          │            │
//!   └─────────┴──────────┴────────────┴──► Stopped
//! ```
//!
//! Every suspension (window wait, point delay, cycle delay, tap in flight)
//! races the worker's cancellation token, and the token is checked again
//! before every tap, so no tap starts after cancellation was requested.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use autotap_core::error::{AutoTapError, Result};
use autotap_core::traits::{Clock, GestureEffector, TapOutcome, TapRequest};
use autotap_core::types::ensure_unique_orders;
use autotap_core::{ConfigId, ConfigurationSnapshot, PointSpec};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::window::{self, WindowStatus};

/// Default upper bound on a single window-wait sleep.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle phase of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    /// Created, window not evaluated yet.
    Idle,
    /// Window not open yet.
    Waiting,
    /// Dispatching taps.
    Active,
    /// Between points or between cycles.
    Sleeping,
    /// Terminal.
    Stopped,
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerPhase::Idle => write!(f, "idle"),
            WorkerPhase::Waiting => write!(f, "waiting"),
            WorkerPhase::Active => write!(f, "active"),
            WorkerPhase::Sleeping => write!(f, "sleeping"),
            WorkerPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Observable state of one worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerState {
    pub configuration_id: ConfigId,
    pub phase: WorkerPhase,
    /// Index into the order-sorted point list.
    pub point_index: usize,
    pub completed_cycles: u32,
    pub last_tap_at: Option<DateTime<Utc>>,
    pub taps_requested: u64,
    /// Taps the effector reported as cancelled or failed.
    pub taps_missed: u64,
    /// Points passed over because their own window excluded the current time.
    pub points_skipped: u64,
}

impl WorkerState {
    pub fn new(configuration_id: ConfigId) -> Self {
        Self {
            configuration_id,
            phase: WorkerPhase::Idle,
            point_index: 0,
            completed_cycles: 0,
            last_tap_at: None,
            taps_requested: 0,
            taps_missed: 0,
            points_skipped: 0,
        }
    }
}

/// Why a worker reached `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Finite repeat count reached.
    Exhausted,
    /// Nothing to execute.
    NoPoints,
    /// The configuration's window closed (or had already expired).
    WindowClosed,
    /// Cancelled from outside.
    Cancelled,
    /// Worker-fatal error.
    Failed(String),
}

impl std::fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerExit::Exhausted => write!(f, "repeat count exhausted"),
            WorkerExit::NoPoints => write!(f, "no click points"),
            WorkerExit::WindowClosed => write!(f, "activation window closed"),
            WorkerExit::Cancelled => write!(f, "cancelled"),
            WorkerExit::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Runs `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Execution loop for one configuration.
pub struct ConfigurationWorker {
    config: ConfigurationSnapshot,
    points: Vec<PointSpec>,
    clock: Arc<dyn Clock>,
    effector: Arc<dyn GestureEffector>,
    poll_interval: Duration,
    status: watch::Sender<WorkerState>,
}

impl ConfigurationWorker {
    pub fn new(
        config: ConfigurationSnapshot,
        points: Vec<PointSpec>,
        clock: Arc<dyn Clock>,
        effector: Arc<dyn GestureEffector>,
    ) -> Self {
        let (status, _) = watch::channel(WorkerState::new(config.id));
        Self {
            config,
            points,
            clock,
            effector,
            poll_interval: DEFAULT_POLL_INTERVAL,
            status,
        }
    }

    /// Bound the window-wait sleep (at least 1ms).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Publish state into an existing channel instead of a private one.
    pub fn with_status(mut self, status: watch::Sender<WorkerState>) -> Self {
        status.send_replace(WorkerState::new(self.config.id));
        self.status = status;
        self
    }

    /// Watch this worker's state.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.status.subscribe()
    }

    /// Run until exhausted, cancelled, window closed or failed.
    pub async fn run(mut self, cancel: CancellationToken) -> WorkerExit {
        let exit = match self.drive(&cancel).await {
            Ok(exit) => exit,
            Err(e) => {
                if e.is_expected_worker_fault() {
                    tracing::warn!("⚠️ Worker for '{}' ({}) stopped: {e}", self.config.name, self.config.id);
                } else {
                    tracing::error!("❌ Worker for '{}' ({}) crashed: {e}", self.config.name, self.config.id);
                }
                WorkerExit::Failed(e.to_string())
            }
        };
        self.update(|s| s.phase = WorkerPhase::Stopped);
        tracing::info!(
            "⏹️ Worker for '{}' ({}) stopped: {exit}",
            self.config.name,
            self.config.id
        );
        exit
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<WorkerExit> {
        self.check_invariants()?;
        self.points.sort_by_key(|p| p.order);

        if self.points.is_empty() {
            tracing::info!("📭 Configuration '{}' has no click points", self.config.name);
            return Ok(WorkerExit::NoPoints);
        }

        if let Some(exit) = self.wait_for_window(cancel).await? {
            return Ok(exit);
        }

        loop {
            let mut dispatched = 0usize;

            for index in 0..self.points.len() {
                if cancel.is_cancelled() {
                    return Ok(WorkerExit::Cancelled);
                }
                let now = self.clock.now();
                if !window::admits(self.config.window.as_ref(), now) {
                    tracing::info!("🔒 Window closed for '{}'", self.config.name);
                    return Ok(WorkerExit::WindowClosed);
                }

                let point = self.points[index].clone();
                self.update(|s| {
                    s.phase = WorkerPhase::Active;
                    s.point_index = index;
                });

                if !window::admits(point.window.as_ref(), now) {
                    tracing::debug!(
                        "⏭️ Skipping point {} (order {}) of '{}': outside its window",
                        point.id,
                        point.order,
                        self.config.name
                    );
                    self.update(|s| s.points_skipped += 1);
                    continue;
                }

                let request = TapRequest {
                    configuration_id: self.config.id,
                    point_id: point.id,
                    x: point.x,
                    y: point.y,
                    size: point.size,
                };
                self.update(|s| {
                    s.taps_requested += 1;
                    s.last_tap_at = Some(now);
                });
                let outcome = match cancellable(cancel, self.effector.perform(&request)).await {
                    Some(outcome) => outcome?,
                    None => return Ok(WorkerExit::Cancelled),
                };
                dispatched += 1;
                self.record_outcome(&point, outcome);

                self.update(|s| s.phase = WorkerPhase::Sleeping);
                match cancellable(cancel, self.clock.sleep_for(point.delay())).await {
                    Some(slept) => slept?,
                    None => return Ok(WorkerExit::Cancelled),
                }
            }

            let completed = self.finish_cycle();
            if !self.config.repeats_forever() && completed >= self.config.repeat_count {
                return Ok(WorkerExit::Exhausted);
            }

            // A cycle where every point was gated out waits at least one poll.
            let pause = if dispatched == 0 {
                self.config.global_delay().max(self.poll_interval)
            } else {
                self.config.global_delay()
            };
            if !pause.is_zero() {
                self.update(|s| s.phase = WorkerPhase::Sleeping);
                match cancellable(cancel, self.clock.sleep_for(pause)).await {
                    Some(slept) => slept?,
                    None => return Ok(WorkerExit::Cancelled),
                }
            }
        }
    }

    /// Idle → Waiting/Active. Returns an exit if the worker must stop instead.
    async fn wait_for_window(&mut self, cancel: &CancellationToken) -> Result<Option<WorkerExit>> {
        loop {
            let now = self.clock.now();
            match window::evaluate(self.config.window.as_ref(), now) {
                WindowStatus::Open => {
                    self.update(|s| s.phase = WorkerPhase::Active);
                    return Ok(None);
                }
                WindowStatus::Expired => {
                    tracing::info!("🔒 Window of '{}' already expired", self.config.name);
                    return Ok(Some(WorkerExit::WindowClosed));
                }
                WindowStatus::Pending { opens_at } => {
                    if self.status.borrow().phase != WorkerPhase::Waiting {
                        tracing::info!(
                            "⏳ '{}' waiting for its window to open at {}",
                            self.config.name,
                            opens_at.format("%Y-%m-%d %H:%M:%S UTC")
                        );
                        self.update(|s| s.phase = WorkerPhase::Waiting);
                    }
                    let until_open = (opens_at - now).to_std().unwrap_or(Duration::ZERO);
                    let woke = if until_open <= self.poll_interval {
                        cancellable(cancel, self.clock.sleep_until(opens_at)).await
                    } else {
                        cancellable(cancel, self.clock.sleep_for(self.poll_interval)).await
                    };
                    match woke {
                        Some(result) => result?,
                        None => return Ok(Some(WorkerExit::Cancelled)),
                    }
                }
            }
        }
    }

    fn check_invariants(&self) -> Result<()> {
        if let Some(window) = &self.config.window {
            if !window.is_well_formed() {
                return Err(AutoTapError::InvalidConfiguration(format!(
                    "'{}': window start must be before end",
                    self.config.name
                )));
            }
        }
        for point in &self.points {
            if let Some(window) = &point.window {
                if !window.is_well_formed() {
                    return Err(AutoTapError::InvalidPoint(format!(
                        "point {}: window start must be before end",
                        point.id
                    )));
                }
            }
        }
        ensure_unique_orders(self.points.iter().map(|p| p.order))
    }

    fn record_outcome(&mut self, point: &PointSpec, outcome: TapOutcome) {
        match outcome {
            TapOutcome::Completed => {
                tracing::debug!(
                    "👆 Tap at ({}, {}) for '{}' completed",
                    point.x,
                    point.y,
                    self.config.name
                );
            }
            TapOutcome::Cancelled => {
                tracing::warn!(
                    "⚠️ Tap at ({}, {}) for '{}' was cancelled, continuing",
                    point.x,
                    point.y,
                    self.config.name
                );
                self.update(|s| s.taps_missed += 1);
            }
            TapOutcome::Failed(reason) => {
                tracing::warn!(
                    "⚠️ Tap at ({}, {}) for '{}' failed: {reason}, continuing",
                    point.x,
                    point.y,
                    self.config.name
                );
                self.update(|s| s.taps_missed += 1);
            }
        }
    }

    fn finish_cycle(&mut self) -> u32 {
        self.update(|s| {
            s.completed_cycles += 1;
            s.point_index = 0;
        });
        let completed = self.status.borrow().completed_cycles;
        tracing::debug!("🔁 '{}' completed cycle {completed}", self.config.name);
        completed
    }

    fn update(&self, f: impl FnOnce(&mut WorkerState)) {
        self.status.send_modify(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::test_support::{OutageClock, RecordingEffector, point, snapshot, t0};
    use autotap_core::ActivationWindow;

    fn worker(
        config: ConfigurationSnapshot,
        points: Vec<PointSpec>,
        clock: &Arc<TokioClock>,
        effector: &Arc<RecordingEffector>,
    ) -> ConfigurationWorker {
        ConfigurationWorker::new(config, points, clock.clone(), effector.clone())
            .with_poll_interval(Duration::from_millis(1000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_point_trace_with_repeat() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));
        let w = worker(
            snapshot(1, 2, 50),
            vec![point(10, 0, 100), point(11, 1, 200)],
            &clock,
            &effector,
        );

        let exit = w.run(CancellationToken::new()).await;
        assert_eq!(exit, WorkerExit::Exhausted);
        assert_eq!(
            effector.trace(1),
            vec![(10, 0), (11, 100), (10, 350), (11, 450)]
        );
        assert_eq!(clock.now() - t0(), chrono::Duration::milliseconds(650));
    }

    #[tokio::test(start_paused = true)]
    async fn test_points_dispatched_in_ascending_order() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));
        // Stored order values [2, 0, 1] at indices 0, 1, 2.
        let w = worker(
            snapshot(1, 1, 0),
            vec![point(100, 2, 10), point(101, 0, 10), point(102, 1, 10)],
            &clock,
            &effector,
        );

        w.run(CancellationToken::new()).await;
        let ids: Vec<_> = effector.trace(1).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![101, 102, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tap_count_is_points_times_repeat() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));
        let w = worker(
            snapshot(1, 4, 20),
            vec![point(1, 0, 5), point(2, 1, 5), point(3, 2, 5)],
            &clock,
            &effector,
        );
        let status = w.subscribe();

        assert_eq!(w.run(CancellationToken::new()).await, WorkerExit::Exhausted);
        assert_eq!(effector.count(1), 12);
        let state = status.borrow().clone();
        assert_eq!(state.phase, WorkerPhase::Stopped);
        assert_eq!(state.completed_cycles, 4);
        assert_eq!(state.taps_requested, 12);
        assert_eq!(state.taps_missed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_window_waits_then_activates() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));
        let window = ActivationWindow::absolute(
            t0() + chrono::Duration::seconds(10),
            t0() + chrono::Duration::seconds(20),
        );
        let mut config = snapshot(1, 1, 0);
        config.window = Some(window);
        let w = worker(config, vec![point(1, 0, 100)], &clock, &effector);
        let mut status = w.subscribe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(w.run(cancel.clone()));

        status
            .wait_for(|s| s.phase == WorkerPhase::Waiting)
            .await
            .unwrap();
        assert_eq!(clock.now(), t0());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(status.borrow().phase, WorkerPhase::Waiting);
        assert_eq!(effector.count(1), 0);

        assert_eq!(handle.await.unwrap(), WorkerExit::Exhausted);
        assert_eq!(effector.trace(1), vec![(1, 10_000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_sleeping_stops_taps() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));
        let w = worker(
            snapshot(1, 0, 0),
            vec![point(1, 0, 1000), point(2, 1, 1000)],
            &clock,
            &effector,
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(w.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(effector.count(1), 2);
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), WorkerExit::Cancelled);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(effector.count(1), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_tap_abandons_request() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector =
            Arc::new(RecordingEffector::new(clock.clone()).with_hold(Duration::from_secs(5)));
        let w = worker(snapshot(1, 0, 0), vec![point(1, 0, 0)], &clock, &effector);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(w.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), WorkerExit::Cancelled);
        assert_eq!(effector.count(1), 1);
        assert_eq!(effector.completed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_infinite_repeat_never_stops_on_its_own() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));
        let w = worker(snapshot(1, 0, 100), vec![point(1, 0, 100)], &clock, &effector);
        let status = w.subscribe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(w.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!handle.is_finished());
        assert_ne!(status.borrow().phase, WorkerPhase::Stopped);
        assert!(status.borrow().completed_cycles >= 250);

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), WorkerExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tap_is_a_recoverable_miss() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(
            RecordingEffector::new(clock.clone())
                .script(2, TapOutcome::Failed("gesture rejected".into())),
        );
        let w = worker(
            snapshot(1, 1, 0),
            vec![point(1, 0, 10), point(2, 1, 10), point(3, 2, 10)],
            &clock,
            &effector,
        );
        let status = w.subscribe();

        assert_eq!(w.run(CancellationToken::new()).await, WorkerExit::Exhausted);
        let ids: Vec<_> = effector.trace(1).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(status.borrow().taps_missed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_point_window_skips_only_that_point() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));
        let mut gated = point(2, 1, 10);
        gated.window = Some(ActivationWindow::absolute(
            t0() + chrono::Duration::hours(1),
            t0() + chrono::Duration::hours(2),
        ));
        let w = worker(
            snapshot(1, 2, 0),
            vec![point(1, 0, 10), gated, point(3, 2, 10)],
            &clock,
            &effector,
        );
        let status = w.subscribe();

        assert_eq!(w.run(CancellationToken::new()).await, WorkerExit::Exhausted);
        // 3 points x 2 cycles minus the gated point twice; no delay for skips.
        assert_eq!(effector.trace(1), vec![(1, 0), (3, 10), (1, 20), (3, 30)]);
        assert_eq!(status.borrow().points_skipped, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_window_closing_stops_worker() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));
        let mut config = snapshot(1, 0, 0);
        config.window = Some(ActivationWindow::absolute(
            t0(),
            t0() + chrono::Duration::milliseconds(250),
        ));
        let w = worker(config, vec![point(1, 0, 100)], &clock, &effector);

        assert_eq!(w.run(CancellationToken::new()).await, WorkerExit::WindowClosed);
        // Taps at 0, 100, 200; the check at 300 finds the window closed.
        assert_eq!(effector.count(1), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_point_list_stops_immediately() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));
        let w = worker(snapshot(1, 0, 0), vec![], &clock, &effector);
        let status = w.subscribe();

        assert_eq!(w.run(CancellationToken::new()).await, WorkerExit::NoPoints);
        assert_eq!(status.borrow().phase, WorkerPhase::Stopped);
        assert_eq!(effector.count(1), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_orders_are_worker_fatal() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));
        let w = worker(
            snapshot(1, 1, 0),
            vec![point(1, 0, 10), point(2, 0, 10)],
            &clock,
            &effector,
        );

        let exit = w.run(CancellationToken::new()).await;
        assert!(matches!(exit, WorkerExit::Failed(reason) if reason.contains("duplicate order")));
        assert_eq!(effector.count(1), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_effector_unavailable_is_worker_fatal() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()).unavailable_for(1));
        let w = worker(snapshot(1, 0, 0), vec![point(1, 0, 10)], &clock, &effector);

        let exit = w.run(CancellationToken::new()).await;
        assert!(matches!(exit, WorkerExit::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_outage_is_worker_fatal() {
        let clock = Arc::new(OutageClock::failing_sleeps_of(
            t0(),
            &[Duration::from_millis(150), Duration::from_millis(1000)],
        ));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));

        // Fails in the delay after the first tap.
        let w = ConfigurationWorker::new(
            snapshot(1, 0, 0),
            vec![point(1, 0, 150)],
            clock.clone(),
            effector.clone(),
        );
        let exit = w.run(CancellationToken::new()).await;
        assert!(matches!(exit, WorkerExit::Failed(reason) if reason.contains("Clock error")));
        assert_eq!(effector.trace(1), vec![(1, 0)]);

        // Fails while waiting for a window that is more than one poll away.
        let mut waiting = snapshot(2, 0, 0);
        waiting.window = Some(ActivationWindow::absolute(
            t0() + chrono::Duration::seconds(10),
            t0() + chrono::Duration::seconds(20),
        ));
        let w = ConfigurationWorker::new(waiting, vec![point(2, 0, 10)], clock, effector.clone())
            .with_poll_interval(Duration::from_millis(1000));
        let status = w.subscribe();
        let exit = w.run(CancellationToken::new()).await;
        assert!(matches!(exit, WorkerExit::Failed(_)));
        assert_eq!(status.borrow().phase, WorkerPhase::Stopped);
        assert_eq!(effector.count(2), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_points_gated_does_not_spin() {
        let clock = Arc::new(TokioClock::starting_at(t0()));
        let effector = Arc::new(RecordingEffector::new(clock.clone()));
        let mut gated = point(1, 0, 500);
        gated.window = Some(ActivationWindow::absolute(
            t0() + chrono::Duration::seconds(3),
            t0() + chrono::Duration::seconds(4),
        ));
        let w = worker(snapshot(1, 0, 0), vec![gated], &clock, &effector);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(w.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(4200)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), WorkerExit::Cancelled);
        // Skipped cycles back off one poll each until the point opens at 3s.
        assert_eq!(effector.trace(1), vec![(1, 3000), (1, 3500), (1, 4000)]);
    }
}
