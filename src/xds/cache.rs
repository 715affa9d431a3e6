//! Shared snapshot store.
//!
//! Snapshots are keyed by node group so different client populations could
//! in principle see different configuration; today every client is served
//! the [`DEFAULT_NODE_GROUP`]. Writers replace a group's snapshot
//! wholesale and the change is announced on a broadcast channel so active
//! streams push the new state instead of polling for it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::info;

use crate::xds::snapshot::Snapshot;

/// Node group every client is assigned to
pub const DEFAULT_NODE_GROUP: &str = "default";

const UPDATE_CHANNEL_CAPACITY: usize = 16;

pub struct SnapshotCache {
    snapshots: RwLock<HashMap<String, Arc<Snapshot>>>,
    updates: broadcast::Sender<String>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self { snapshots: RwLock::new(HashMap::new()), updates }
    }

    /// Replaces the snapshot for `node_group` and announces the change
    pub async fn set_snapshot(&self, node_group: &str, snapshot: Snapshot) {
        info!(
            node_group = %node_group,
            version = %snapshot.version,
            clusters = snapshot.clusters.len(),
            load_assignments = snapshot.load_assignments.len(),
            route_tables = snapshot.route_tables.len(),
            "Installing snapshot"
        );

        {
            let mut guard = self.snapshots.write().await;
            guard.insert(node_group.to_string(), Arc::new(snapshot));
        }

        // Send fails only when no stream is subscribed, which is fine.
        let _ = self.updates.send(node_group.to_string());
    }

    /// Current snapshot for `node_group`, if one has been installed
    pub async fn snapshot(&self, node_group: &str) -> Option<Arc<Snapshot>> {
        let guard = self.snapshots.read().await;
        guard.get(node_group).cloned()
    }

    /// Subscribes to snapshot replacement announcements. Each message is
    /// the node group whose snapshot changed.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.updates.subscribe()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let cache = SnapshotCache::new();
        assert!(cache.snapshot(DEFAULT_NODE_GROUP).await.is_none());

        cache.set_snapshot(DEFAULT_NODE_GROUP, Snapshot::empty()).await;
        let installed = cache.snapshot(DEFAULT_NODE_GROUP).await.unwrap();
        assert_eq!(installed.version, Snapshot::empty().version);
    }

    #[tokio::test]
    async fn test_replacement_is_wholesale() {
        let cache = SnapshotCache::new();
        let mut first = Snapshot::empty();
        first.clusters.push(crate::xds::resources::cluster_for_service("payments"));
        cache.set_snapshot(DEFAULT_NODE_GROUP, first).await;

        cache.set_snapshot(DEFAULT_NODE_GROUP, Snapshot::empty()).await;
        let current = cache.snapshot(DEFAULT_NODE_GROUP).await.unwrap();
        assert!(current.clusters.is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_hear_about_replacements() {
        let cache = SnapshotCache::new();
        let mut updates = cache.subscribe();

        cache.set_snapshot(DEFAULT_NODE_GROUP, Snapshot::empty()).await;
        let group = updates.recv().await.unwrap();
        assert_eq!(group, DEFAULT_NODE_GROUP);
    }

    #[tokio::test]
    async fn test_node_groups_are_independent() {
        let cache = SnapshotCache::new();
        cache.set_snapshot("edge", Snapshot::empty()).await;
        assert!(cache.snapshot(DEFAULT_NODE_GROUP).await.is_none());
        assert!(cache.snapshot("edge").await.is_some());
    }
}
