//! Scheduler supervisor — keeps exactly one worker per active configuration.
//!
//! The supervisor subscribes to the configuration source's active-set stream
//! and reconciles the worker registry against every new set:
//! removed configurations have their workers cancelled (and awaited),
//! changed snapshots restart their worker, new ones get a worker spawned.
//! Worker failures and panics are contained to the worker that raised them.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use autotap_core::config::SchedulerConfig;
use autotap_core::traits::{Clock, ConfigurationSource, GestureEffector};
use autotap_core::{ActivationWindow, ConfigId, ConfigurationSnapshot};
use futures::{FutureExt, StreamExt};
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::window;
use crate::worker::{ConfigurationWorker, WorkerExit, WorkerPhase, WorkerState};

/// Sent by a worker task when it has finished.
#[derive(Debug)]
struct ExitNotice {
    id: ConfigId,
    generation: u64,
    exit: WorkerExit,
}

struct WorkerSlot {
    generation: u64,
    snapshot: ConfigurationSnapshot,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    status: watch::Receiver<WorkerState>,
}

impl WorkerSlot {
    /// Cancel and wait until the worker task is gone.
    async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }

    async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!("⚠️ Worker task for configuration {} ended abnormally: {e}", self.snapshot.id);
        }
    }
}

#[derive(Default)]
struct Registry {
    slots: HashMap<ConfigId, WorkerSlot>,
    /// Configurations whose worker finished for good, keyed to the snapshot
    /// it ran with. Not respawned until the snapshot changes or it is
    /// deactivated and reactivated.
    retired: HashMap<ConfigId, ConfigurationSnapshot>,
    /// Last active set observed from the source.
    latest: Vec<ConfigurationSnapshot>,
    next_generation: u64,
}

struct Shared {
    source: Arc<dyn ConfigurationSource>,
    effector: Arc<dyn GestureEffector>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    registry: Mutex<Registry>,
    wake: Notify,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Top-level scheduler: owns the worker registry and its lifecycle.
pub struct SchedulerSupervisor {
    shared: Arc<Shared>,
    lifecycle: Mutex<Option<Running>>,
    running: AtomicBool,
}

impl SchedulerSupervisor {
    pub fn new(
        source: Arc<dyn ConfigurationSource>,
        effector: Arc<dyn GestureEffector>,
        clock: Arc<dyn Clock>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                effector,
                clock,
                poll_interval: Duration::from_millis(config.window_poll_ms.max(1)),
                registry: Mutex::new(Registry::default()),
                wake: Notify::new(),
            }),
            lifecycle: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Start observing the active set. Calling it again while running is a no-op.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            tracing::debug!("Scheduler already running");
            return;
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(self.shared.clone(), cancel.clone()));
        *lifecycle = Some(Running { cancel, task });
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("▶️ Scheduler started (effector: {})", self.shared.effector.name());
    }

    /// Cancel every worker and return once all of them have terminated.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            tracing::error!("❌ Scheduler loop ended abnormally: {e}");
            self.shared.shutdown_workers().await;
        }
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("⏹️ Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// State of every live worker, ordered by configuration id.
    pub async fn workers(&self) -> Vec<WorkerState> {
        let registry = self.shared.registry.lock().await;
        let mut states: Vec<WorkerState> = registry
            .slots
            .values()
            .map(|slot| slot.status.borrow().clone())
            .collect();
        states.sort_by_key(|s| s.configuration_id);
        states
    }

    /// Restart one configuration's worker from its first point.
    ///
    /// Also re-arms a configuration whose worker already finished. Returns
    /// `false` if the configuration has neither a worker nor a finished run.
    pub async fn restart_worker(&self, id: ConfigId) -> bool {
        let found = {
            let mut registry = self.shared.registry.lock().await;
            let was_retired = registry.retired.remove(&id).is_some();
            let slot = registry.slots.remove(&id);
            let had_worker = slot.is_some();
            if let Some(slot) = slot {
                tracing::info!("🔄 Restarting worker for '{}' ({id})", slot.snapshot.name);
                slot.shutdown().await;
            }
            was_retired || had_worker
        };
        if found {
            self.shared.wake.notify_one();
        }
        found
    }
}

/// Supervisor loop; runs until `cancel` fires.
async fn supervise(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut updates = shared.source.active_configurations();
    let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<ExitNotice>();
    let mut source_open = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(notice) = exit_rx.recv() => {
                shared.handle_exit(notice, &cancel, &exit_tx).await;
            }
            update = updates.next(), if source_open => match update {
                Some(active) => shared.reconcile(Some(active), &cancel, &exit_tx).await,
                None => {
                    tracing::warn!("⚠️ Configuration source closed; keeping current workers");
                    source_open = false;
                }
            },
            _ = shared.wake.notified() => {
                shared.reconcile(None, &cancel, &exit_tx).await;
            }
        }
    }

    shared.shutdown_workers().await;
}

impl Shared {
    /// Bring the registry in line with the active set.
    ///
    /// `active` replaces the remembered set; `None` re-runs against it.
    async fn reconcile(
        &self,
        active: Option<Vec<ConfigurationSnapshot>>,
        cancel: &CancellationToken,
        exit_tx: &mpsc::UnboundedSender<ExitNotice>,
    ) {
        let mut registry = self.registry.lock().await;
        if let Some(active) = active {
            registry.latest = active;
        }

        let now = self.clock.now();
        let mut desired: HashMap<ConfigId, ConfigurationSnapshot> = HashMap::new();
        for snapshot in &registry.latest {
            if window::is_expired(snapshot.window.as_ref(), now) {
                continue;
            }
            desired.insert(snapshot.id, snapshot.clone());
        }

        registry
            .retired
            .retain(|id, snapshot| desired.get(id) == Some(&*snapshot));

        let stale: Vec<ConfigId> = registry
            .slots
            .iter()
            .filter(|(id, slot)| desired.get(*id) != Some(&slot.snapshot))
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(slot) = registry.slots.remove(&id) {
                if desired.contains_key(&id) {
                    tracing::info!("✏️ Configuration '{}' ({id}) changed, restarting worker", slot.snapshot.name);
                } else {
                    tracing::info!("🛑 Configuration '{}' ({id}) no longer active", slot.snapshot.name);
                }
                slot.shutdown().await;
            }
        }

        let mut additions: Vec<ConfigurationSnapshot> = desired
            .into_values()
            .filter(|s| !registry.slots.contains_key(&s.id) && !registry.retired.contains_key(&s.id))
            .collect();
        additions.sort_by_key(|s| s.id);
        for snapshot in additions {
            self.spawn_worker(&mut registry, snapshot, cancel, exit_tx);
        }
    }

    fn spawn_worker(
        &self,
        registry: &mut Registry,
        snapshot: ConfigurationSnapshot,
        parent: &CancellationToken,
        exit_tx: &mpsc::UnboundedSender<ExitNotice>,
    ) {
        registry.next_generation += 1;
        let generation = registry.next_generation;
        let id = snapshot.id;
        let cancel = parent.child_token();
        let (status_tx, status_rx) = watch::channel(WorkerState::new(id));

        let run = run_worker(
            self.source.clone(),
            self.clock.clone(),
            self.effector.clone(),
            self.poll_interval,
            snapshot.clone(),
            status_tx,
            cancel.clone(),
        );
        let exit_tx = exit_tx.clone();
        let handle = tokio::spawn(async move {
            let exit = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(exit) => exit,
                Err(_) => {
                    tracing::error!("💥 Worker for configuration {id} panicked");
                    WorkerExit::Failed("worker panicked".into())
                }
            };
            let _ = exit_tx.send(ExitNotice { id, generation, exit });
        });

        tracing::info!("🚀 Worker spawned for '{}' ({id})", snapshot.name);
        registry.slots.insert(
            id,
            WorkerSlot {
                generation,
                snapshot,
                cancel,
                handle,
                status: status_rx,
            },
        );
    }

    async fn handle_exit(
        &self,
        notice: ExitNotice,
        cancel: &CancellationToken,
        exit_tx: &mpsc::UnboundedSender<ExitNotice>,
    ) {
        {
            let mut registry = self.registry.lock().await;
            let current = registry
                .slots
                .get(&notice.id)
                .is_some_and(|slot| slot.generation == notice.generation);
            if !current {
                // Already replaced or removed by a reconcile.
                return;
            }
            let Some(slot) = registry.slots.remove(&notice.id) else {
                return;
            };
            let snapshot = slot.snapshot.clone();
            slot.join().await;

            match &notice.exit {
                WorkerExit::Cancelled => {}
                WorkerExit::WindowClosed
                    if snapshot.window.as_ref().is_some_and(ActivationWindow::is_recurring) =>
                {
                    tracing::info!("🌙 '{}' ({}) will wait for its next window", snapshot.name, snapshot.id);
                }
                WorkerExit::Failed(reason) => {
                    tracing::warn!("⚠️ Worker for '{}' ({}) failed: {reason}", snapshot.name, snapshot.id);
                    registry.retired.insert(notice.id, snapshot);
                }
                exit => {
                    tracing::info!("✅ Worker for '{}' ({}) finished: {exit}", snapshot.name, snapshot.id);
                    registry.retired.insert(notice.id, snapshot);
                }
            }
        }
        self.reconcile(None, cancel, exit_tx).await;
    }

    /// Cancel all workers, then wait for each of them.
    async fn shutdown_workers(&self) {
        let mut registry = self.registry.lock().await;
        let slots: Vec<WorkerSlot> = registry.slots.drain().map(|(_, slot)| slot).collect();
        for slot in &slots {
            slot.cancel.cancel();
        }
        let count = slots.len();
        for slot in slots {
            slot.join().await;
        }
        registry.retired.clear();
        registry.latest.clear();
        if count > 0 {
            tracing::info!("🧹 Stopped {count} worker(s)");
        }
    }
}

/// Fetch the points, then drive the worker to completion.
async fn run_worker(
    source: Arc<dyn ConfigurationSource>,
    clock: Arc<dyn Clock>,
    effector: Arc<dyn GestureEffector>,
    poll_interval: Duration,
    snapshot: ConfigurationSnapshot,
    status_tx: watch::Sender<WorkerState>,
    cancel: CancellationToken,
) -> WorkerExit {
    let points = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            status_tx.send_modify(|s| s.phase = WorkerPhase::Stopped);
            return WorkerExit::Cancelled;
        }
        points = source.points_for(snapshot.id) => points,
    };
    match points {
        Ok(points) => {
            ConfigurationWorker::new(snapshot, points, clock, effector)
                .with_poll_interval(poll_interval)
                .with_status(status_tx)
                .run(cancel)
                .await
        }
        Err(e) => {
            tracing::warn!("⚠️ Could not load points for '{}' ({}): {e}", snapshot.name, snapshot.id);
            status_tx.send_modify(|s| s.phase = WorkerPhase::Stopped);
            WorkerExit::Failed(e.to_string())
        }
    }
}
