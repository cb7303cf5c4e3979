/*
 * Copyright 2023 Google LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;

use super::Snapshot;

/// Holds the latest snapshot published for each node key. Distribution to
/// proxies reads from here.
pub trait SnapshotCache: Send + Sync {
    /// Replaces the snapshot for `key`. Readers observe either the previous
    /// snapshot or this one, never a mix.
    fn set_snapshot(&self, key: &str, snapshot: Snapshot);
    fn get_snapshot(&self, key: &str) -> Option<Arc<Snapshot>>;
    fn list_keys(&self) -> Vec<String>;
}

/// A [`SnapshotCache`] kept in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotCache {
    snapshots: RwLock<BTreeMap<String, Arc<Snapshot>>>,
}

impl MemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotCache for MemorySnapshotCache {
    fn set_snapshot(&self, key: &str, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        let mut snapshots = self.snapshots.write();
        if snapshots.get(key) == Some(&snapshot) {
            return;
        }
        tracing::trace!(key, "snapshot updated");
        snapshots.insert(key.to_owned(), snapshot);
    }

    fn get_snapshot(&self, key: &str) -> Option<Arc<Snapshot>> {
        self.snapshots.read().get(key).cloned()
    }

    fn list_keys(&self) -> Vec<String> {
        self.snapshots.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_and_list() {
        let cache = MemorySnapshotCache::new();
        assert!(cache.get_snapshot("default~gw").is_none());

        cache.set_snapshot("default~gw", Snapshot::empty());
        cache.set_snapshot("fallback", Snapshot::empty());

        assert_eq!(
            vec!["default~gw".to_string(), "fallback".to_string()],
            cache.list_keys()
        );
        assert_eq!(Snapshot::empty(), *cache.get_snapshot("default~gw").unwrap());
    }

    #[test]
    fn unchanged_snapshot_keeps_identity() {
        let cache = MemorySnapshotCache::new();
        cache.set_snapshot("key", Snapshot::empty());
        let before = cache.get_snapshot("key").unwrap();

        cache.set_snapshot("key", Snapshot::empty());
        assert!(Arc::ptr_eq(&before, &cache.get_snapshot("key").unwrap()));
    }
}
