//! Configuration source trait — the scheduler's read path into storage.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::{ConfigId, ConfigurationSnapshot, PointSpec};

/// Live view of the configurations that should run.
#[async_trait]
pub trait ConfigurationSource: Send + Sync {
    /// Stream of the full active set, yielded on every change.
    ///
    /// Each item is deduplicated by id; order is unspecified. The first item
    /// is the current set.
    fn active_configurations(&self) -> BoxStream<'static, Vec<ConfigurationSnapshot>>;

    /// Points of one configuration as of now.
    async fn points_for(&self, configuration_id: ConfigId) -> Result<Vec<PointSpec>>;
}
