//! Configuration source that polls the SQLite store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autotap_core::error::{AutoTapError, Result};
use autotap_core::traits::{Clock, ConfigurationSource};
use autotap_core::{ClickPoint, ConfigId, ConfigurationSnapshot, PointSpec};
use futures::StreamExt;
use futures::stream::{self, BoxStream};

use crate::persistence::ConfigDb;

/// Re-reads the active set every `poll` and yields it when it changed.
///
/// Queries run on the blocking pool; the stream ends if the clock fails.
pub struct DbSource {
    db: Arc<ConfigDb>,
    clock: Arc<dyn Clock>,
    poll: Duration,
}

impl DbSource {
    pub fn new(db: Arc<ConfigDb>, clock: Arc<dyn Clock>, poll: Duration) -> Self {
        Self {
            db,
            clock,
            poll: poll.max(Duration::from_millis(1)),
        }
    }
}

/// Run a store query off the async runtime.
async fn query<T, F>(db: &Arc<ConfigDb>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&ConfigDb) -> Result<T> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| AutoTapError::Source(format!("storage query aborted: {e}")))?
}

struct PollState {
    db: Arc<ConfigDb>,
    clock: Arc<dyn Clock>,
    poll: Duration,
    last: Option<Vec<ConfigurationSnapshot>>,
}

#[async_trait]
impl ConfigurationSource for DbSource {
    fn active_configurations(&self) -> BoxStream<'static, Vec<ConfigurationSnapshot>> {
        let state = PollState {
            db: self.db.clone(),
            clock: self.clock.clone(),
            poll: self.poll,
            last: None,
        };
        stream::unfold(state, |mut state| async move {
            loop {
                if state.last.is_some() {
                    if let Err(e) = state.clock.sleep_for(state.poll).await {
                        tracing::error!("❌ Stopped polling configurations: {e}");
                        return None;
                    }
                }
                match query(&state.db, ConfigDb::active_snapshots).await {
                    Ok(active) => {
                        if state.last.as_ref() != Some(&active) {
                            state.last = Some(active.clone());
                            return Some((active, state));
                        }
                    }
                    Err(e) => {
                        tracing::warn!("⚠️ Failed to read active configurations: {e}");
                        if state.last.is_none() {
                            state.last = Some(Vec::new());
                            return Some((Vec::new(), state));
                        }
                    }
                }
            }
        })
        .boxed()
    }

    async fn points_for(&self, configuration_id: ConfigId) -> Result<Vec<PointSpec>> {
        let points = query(&self.db, move |db| db.points_for(configuration_id)).await?;
        Ok(points.iter().map(ClickPoint::spec).collect())
    }
}
