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

//! The boundary between translation and proxy configuration distribution:
//! compiling proxies into versioned snapshots and keeping the snapshot
//! cache in sync with the cluster.

mod cache;
mod compiler;
pub(crate) mod metrics;
mod queue;
mod sanitizer;
mod snapshot;
mod syncer;

use serde::Serialize;

use crate::{
    proxy::Proxy,
    resources::{Endpoint, Secret, Upstream},
};

pub use self::{
    cache::{MemorySnapshotCache, SnapshotCache},
    compiler::{BasicCompiler, ConfigCompiler},
    queue::{AsyncQueue, XdsInputChannels},
    sanitizer::{NoopSanitizer, RouteReplacingSanitizer, Sanitizer},
    snapshot::{ResourceType, Resources, Snapshot, EMPTY_VERSION},
    syncer::{InputEvent, Introspection, SyncerOptions, Warmth, XdsSyncer},
};

/// The cache key of proxies that cannot be matched to a translated gateway.
pub const FALLBACK_NODE_CACHE_KEY: &str = "fallback";

/// The cache key `proxy`'s snapshot is published under.
pub fn snapshot_cache_key(proxy: &Proxy) -> String {
    format!("{}~{}", proxy.namespace, proxy.name)
}

/// Everything one reconciliation pass works from: the translated proxies and
/// the discovery data and secrets held at the time.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSnapshot {
    pub proxies: Vec<Proxy>,
    pub upstreams: Vec<Upstream>,
    pub endpoints: Vec<Endpoint>,
    pub secrets: Vec<Secret>,
}

impl ApiSnapshot {
    /// A stable hash of the snapshot's content, for logging.
    pub fn hash(&self) -> u64 {
        serde_json::to_vec(self)
            .map(|bytes| seahash::hash(&bytes))
            .unwrap_or_default()
    }
}
