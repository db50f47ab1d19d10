//! In-memory configuration source.
//!
//! Holds configurations and their points in a map and publishes the active
//! set through a `watch` channel whenever it changes.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use autotap_core::error::{AutoTapError, Result};
use autotap_core::traits::ConfigurationSource;
use autotap_core::{ClickPoint, ConfigId, Configuration, ConfigurationSnapshot, PointSpec};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

struct Entry {
    configuration: Configuration,
    points: Vec<ClickPoint>,
}

/// Configuration source backed by process memory.
pub struct MemorySource {
    catalog: RwLock<BTreeMap<ConfigId, Entry>>,
    active: watch::Sender<Vec<ConfigurationSnapshot>>,
}

impl MemorySource {
    pub fn new() -> Self {
        let (active, _) = watch::channel(Vec::new());
        Self {
            catalog: RwLock::new(BTreeMap::new()),
            active,
        }
    }

    /// Insert or replace a configuration and its points.
    pub fn upsert(&self, configuration: Configuration, points: Vec<ClickPoint>) {
        {
            let mut catalog = self.catalog.write().unwrap_or_else(|e| e.into_inner());
            catalog.insert(
                configuration.id,
                Entry {
                    configuration,
                    points,
                },
            );
        }
        self.publish();
    }

    /// Replace the points of a stored configuration.
    pub fn replace_points(&self, id: ConfigId, points: Vec<ClickPoint>) -> bool {
        let mut catalog = self.catalog.write().unwrap_or_else(|e| e.into_inner());
        match catalog.get_mut(&id) {
            Some(entry) => {
                entry.points = points;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: ConfigId) -> bool {
        let removed = {
            let mut catalog = self.catalog.write().unwrap_or_else(|e| e.into_inner());
            catalog.remove(&id).is_some()
        };
        if removed {
            self.publish();
        }
        removed
    }

    pub fn set_active(&self, id: ConfigId, active: bool) -> bool {
        let found = {
            let mut catalog = self.catalog.write().unwrap_or_else(|e| e.into_inner());
            match catalog.get_mut(&id) {
                Some(entry) => {
                    entry.configuration.is_active = active;
                    true
                }
                None => false,
            }
        };
        if found {
            self.publish();
        }
        found
    }

    /// Current active set.
    pub fn active_snapshots(&self) -> Vec<ConfigurationSnapshot> {
        let catalog = self.catalog.read().unwrap_or_else(|e| e.into_inner());
        catalog
            .values()
            .filter(|e| e.configuration.is_active)
            .map(|e| e.configuration.snapshot())
            .collect()
    }

    fn publish(&self) {
        let next = self.active_snapshots();
        self.active.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigurationSource for MemorySource {
    fn active_configurations(&self) -> BoxStream<'static, Vec<ConfigurationSnapshot>> {
        WatchStream::new(self.active.subscribe()).boxed()
    }

    async fn points_for(&self, configuration_id: ConfigId) -> Result<Vec<PointSpec>> {
        let catalog = self.catalog.read().unwrap_or_else(|e| e.into_inner());
        let entry = catalog
            .get(&configuration_id)
            .ok_or(AutoTapError::ConfigurationNotFound(configuration_id))?;
        let mut points: Vec<PointSpec> = entry.points.iter().map(ClickPoint::spec).collect();
        points.sort_by_key(|p| p.order);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotap_core::config::PointLimits;

    fn config(id: ConfigId, active: bool) -> Configuration {
        let mut c = Configuration::new(&format!("c{id}"));
        c.id = id;
        c.is_active = active;
        c
    }

    #[tokio::test]
    async fn test_stream_yields_current_then_changes() {
        let source = MemorySource::new();
        source.upsert(config(1, true), vec![]);
        source.upsert(config(2, false), vec![]);

        let mut stream = source.active_configurations();
        let first = stream.next().await.unwrap();
        assert_eq!(first.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1]);

        source.set_active(2, true);
        let second = stream.next().await.unwrap();
        assert_eq!(second.len(), 2);

        source.remove(1);
        let third = stream.next().await.unwrap();
        assert_eq!(third.iter().map(|s| s.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn test_points_sorted_by_order() {
        let source = MemorySource::new();
        let limits = PointLimits::default();
        let points: Vec<ClickPoint> = [2u32, 0, 1]
            .iter()
            .enumerate()
            .map(|(i, order)| {
                let mut p = ClickPoint::new(1, 0.0, 0.0, &limits);
                p.id = i as i64 + 1;
                p.order = *order;
                p
            })
            .collect();
        source.upsert(config(1, true), points);

        let specs = source.points_for(1).await.unwrap();
        assert_eq!(specs.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 3, 1]);
        assert!(matches!(
            source.points_for(9).await,
            Err(AutoTapError::ConfigurationNotFound(9))
        ));
    }

    #[test]
    fn test_unknown_ids() {
        let source = MemorySource::new();
        assert!(!source.set_active(5, true));
        assert!(!source.remove(5));
        assert!(!source.replace_points(5, vec![]));
    }
}
