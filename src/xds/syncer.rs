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

use std::{collections::BTreeSet, sync::Arc};

use arc_swap::ArcSwapOption;
use tokio_util::sync::CancellationToken;

use super::{
    metrics, snapshot_cache_key, ApiSnapshot, BasicCompiler, ConfigCompiler, ResourceType,
    RouteReplacingSanitizer, Sanitizer, Snapshot, SnapshotCache, XdsInputChannels,
    FALLBACK_NODE_CACHE_KEY,
};
use crate::{
    providers::ResourceClient,
    query::ResourceIndex,
    reports::ReportMap,
    resources::{DiscoveryInputs, KubeObject, ResourceKey, ResourceSnapshot, SecretInputs},
    translator::Translator,
};

/// Which input categories have been observed at least once. Only ever moves
/// towards [`Warmth::Warm`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Warmth {
    #[default]
    Cold,
    DiscoveryOnly,
    SecretsOnly,
    Warm,
}

impl Warmth {
    #[must_use]
    pub fn observe_discovery(self) -> Self {
        match self {
            Self::Cold | Self::DiscoveryOnly => Self::DiscoveryOnly,
            Self::SecretsOnly | Self::Warm => Self::Warm,
        }
    }

    #[must_use]
    pub fn observe_secrets(self) -> Self {
        match self {
            Self::Cold | Self::SecretsOnly => Self::SecretsOnly,
            Self::DiscoveryOnly | Self::Warm => Self::Warm,
        }
    }

    pub fn is_warm(self) -> bool {
        self == Self::Warm
    }
}

/// An input observed by the syncer loop.
#[derive(Clone, Debug)]
pub enum InputEvent {
    /// Routing resources changed.
    Kick,
    Discovery(DiscoveryInputs),
    Secrets(SecretInputs),
}

#[derive(Clone, Debug)]
pub struct SyncerOptions {
    /// Written into every status so ownership of it is visible.
    pub controller_name: String,
    /// Whether snapshots of proxies that no longer exist are emptied.
    pub garbage_collection: bool,
}

impl Default for SyncerOptions {
    fn default() -> Self {
        Self {
            controller_name: crate::config::DEFAULT_CONTROLLER_NAME.into(),
            garbage_collection: true,
        }
    }
}

/// Read only access to what the syncer has published, for diagnostics.
#[derive(Clone)]
pub struct Introspection {
    cache: Arc<dyn SnapshotCache>,
    latest: Arc<ArcSwapOption<ApiSnapshot>>,
}

impl Introspection {
    pub fn new(cache: Arc<dyn SnapshotCache>, latest: Arc<ArcSwapOption<ApiSnapshot>>) -> Self {
        Self { cache, latest }
    }

    pub fn keys(&self) -> Vec<String> {
        self.cache.list_keys()
    }

    pub fn snapshot(&self, key: &str) -> Option<Arc<Snapshot>> {
        self.cache.get_snapshot(key)
    }

    /// The input of the last completed reconciliation pass.
    pub fn latest(&self) -> Option<Arc<ApiSnapshot>> {
        self.latest.load_full()
    }
}

/// Reconciles routing resources, discovery data and secrets into the
/// snapshot cache. All held state is owned by the loop; producers only talk
/// to it through [`XdsInputChannels`].
pub struct XdsSyncer {
    options: SyncerOptions,
    translator: Translator,
    compiler: Arc<dyn ConfigCompiler>,
    sanitizer: Arc<dyn Sanitizer>,
    cache: Arc<dyn SnapshotCache>,
    client: Arc<dyn ResourceClient>,
    inputs: XdsInputChannels,
    latest: Arc<ArcSwapOption<ApiSnapshot>>,
    warmth: Warmth,
    discovery: DiscoveryInputs,
    secrets: SecretInputs,
    resyncs: u64,
}

impl XdsSyncer {
    pub fn new(
        options: SyncerOptions,
        translator: Translator,
        client: Arc<dyn ResourceClient>,
        cache: Arc<dyn SnapshotCache>,
        inputs: XdsInputChannels,
    ) -> Self {
        Self {
            options,
            translator,
            compiler: Arc::new(BasicCompiler),
            sanitizer: Arc::new(RouteReplacingSanitizer::default()),
            cache,
            client,
            inputs,
            latest: <_>::default(),
            warmth: Warmth::default(),
            discovery: DiscoveryInputs::default(),
            secrets: SecretInputs::default(),
            resyncs: 0,
        }
    }

    #[must_use]
    pub fn with_compiler(mut self, compiler: Arc<dyn ConfigCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn introspection(&self) -> Introspection {
        Introspection {
            cache: self.cache.clone(),
            latest: self.latest.clone(),
        }
    }

    pub fn warmth(&self) -> Warmth {
        self.warmth
    }

    /// The number of reconciliation passes attempted so far.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Runs the syncer on its own thread and runtime until `shutdown` is
    /// cancelled.
    pub fn spawn(
        self,
        shutdown: CancellationToken,
    ) -> std::io::Result<std::thread::JoinHandle<crate::Result<()>>> {
        std::thread::Builder::new()
            .name("xds-syncer".into())
            .spawn(move || -> crate::Result<()> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .thread_name("xds-syncer")
                    .build()?;
                runtime.block_on(self.run(shutdown))
            })
    }

    /// Processes input events one at a time until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) -> crate::Result<()> {
        tracing::info!("starting xds syncer");
        let inputs = self.inputs.clone();

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(event) = inputs.next_event() => event,
            };

            self.handle(&shutdown, event).await;
        }

        tracing::info!("xds syncer stopped");
        Ok(())
    }

    /// Applies `event` to the held state and resyncs once both discovery
    /// data and secrets have been seen.
    pub async fn handle(&mut self, cancel: &CancellationToken, event: InputEvent) {
        match event {
            InputEvent::Kick => {}
            InputEvent::Discovery(discovery) => {
                self.discovery = discovery;
                self.warmth = self.warmth.observe_discovery();
            }
            InputEvent::Secrets(secrets) => {
                self.secrets = secrets;
                self.warmth = self.warmth.observe_secrets();
            }
        }

        if !self.warmth.is_warm() {
            tracing::debug!(warmth = ?self.warmth, "inputs not warm, skipping resync");
            metrics::COLD_EVENTS.inc();
            return;
        }

        self.resync(cancel).await;
    }

    #[tracing::instrument(skip_all, fields(pass = self.resyncs + 1))]
    async fn resync(&mut self, cancel: &CancellationToken) {
        self.resyncs += 1;

        let resources = match self.client.list().await {
            Ok(resources) => resources,
            Err(error) => {
                tracing::warn!(%error, "failed to list resources, skipping resync");
                metrics::resyncs(metrics::RESULT_LIST_FAILED).inc();
                return;
            }
        };

        let index = ResourceIndex::new(&resources);
        let mut reports = ReportMap::new();
        reports.accept_all(resources.keys());

        let mut proxies = Vec::with_capacity(resources.gateways.len());
        for gateway in &resources.gateways {
            let mut gateway_reports = ReportMap::new();
            let proxy = self.translator.translate_proxy(
                cancel,
                gateway,
                &index,
                &resources,
                &mut gateway_reports,
            );
            reports.merge(gateway_reports);
            proxies.extend(proxy);
        }

        let input = ApiSnapshot {
            proxies,
            upstreams: self.discovery.upstreams.clone(),
            endpoints: self.discovery.endpoints.clone(),
            secrets: self.secrets.secrets.clone(),
        };
        let snapshots = self.compile(&input, &mut reports);

        if cancel.is_cancelled() {
            tracing::debug!("resync cancelled before publishing");
            metrics::resyncs(metrics::RESULT_CANCELLED).inc();
            return;
        }

        self.publish(snapshots);
        tracing::debug!(
            proxies = input.proxies.len(),
            hash = input.hash(),
            "snapshots published"
        );
        self.latest.store(Some(Arc::new(input)));

        self.sync_status(cancel, &resources, &reports).await;
        metrics::resyncs(metrics::RESULT_OK).inc();
    }

    /// Compiles, sanitizes and repairs a snapshot for every proxy in
    /// `input`.
    fn compile(&self, input: &ApiSnapshot, reports: &mut ReportMap) -> Vec<(String, Snapshot)> {
        input
            .proxies
            .iter()
            .map(|proxy| {
                let snapshot = self.compiler.compile(input, proxy, reports);
                let mut snapshot = self.sanitizer.sanitize(input, proxy, snapshot, reports);
                snapshot.make_consistent();
                (snapshot_cache_key(proxy), snapshot)
            })
            .collect()
    }

    fn publish(&self, snapshots: Vec<(String, Snapshot)>) {
        let mut live = BTreeSet::new();
        for (key, snapshot) in snapshots {
            for ty in ResourceType::VARIANTS {
                metrics::snapshot_resources(&key, &ty.to_string())
                    .set(snapshot.resources(*ty).len() as i64);
            }
            self.cache.set_snapshot(&key, snapshot);
            live.insert(key);
        }

        if !self.options.garbage_collection {
            return;
        }

        live.insert(FALLBACK_NODE_CACHE_KEY.to_owned());
        for key in self.cache.list_keys() {
            if live.contains(&key) {
                continue;
            }
            // Stale keys are emptied rather than removed so connected proxies
            // keep a valid, if empty, configuration.
            tracing::debug!(%key, "emptying stale snapshot");
            self.cache.set_snapshot(&key, Snapshot::empty());
            for ty in ResourceType::VARIANTS {
                metrics::snapshot_resources(&key, &ty.to_string()).set(0);
            }
        }
    }

    async fn sync_status(
        &self,
        cancel: &CancellationToken,
        resources: &ResourceSnapshot,
        reports: &ReportMap,
    ) {
        let controller = &self.options.controller_name;

        for gateway in &resources.gateways {
            if cancel.is_cancelled() {
                return;
            }
            let status = reports.build_gateway_status(gateway, controller);
            if gateway.status.as_ref() == Some(&status) {
                continue;
            }
            let result = self.client.write_gateway_status(gateway, status).await;
            status_written(gateway, result);
        }

        for virtual_service in &resources.virtual_services {
            if cancel.is_cancelled() {
                return;
            }
            let status = reports.build_route_status(&ResourceKey::of(virtual_service), controller);
            if virtual_service.status.as_ref() == Some(&status) {
                continue;
            }
            let result = self
                .client
                .write_virtual_service_status(virtual_service, status)
                .await;
            status_written(virtual_service, result);
        }

        for route_table in &resources.route_tables {
            if cancel.is_cancelled() {
                return;
            }
            let status = reports.build_route_status(&ResourceKey::of(route_table), controller);
            if route_table.status.as_ref() == Some(&status) {
                continue;
            }
            let result = self
                .client
                .write_route_table_status(route_table, status)
                .await;
            status_written(route_table, result);
        }
    }
}

fn status_written(object: &dyn KubeObject, result: Result<(), crate::providers::Error>) {
    if let Err(error) = result {
        let key = ResourceKey::of(object);
        tracing::warn!(%error, resource = %key, "failed to write status");
        metrics::status_write_failures(&key.kind).inc();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        plugins::PluginRegistry,
        test::{gateway, FakeResourceClient},
        xds::MemorySnapshotCache,
    };

    #[test]
    fn warmth_is_monotonic() {
        let warmth = Warmth::Cold.observe_discovery();
        assert_eq!(Warmth::DiscoveryOnly, warmth);
        assert_eq!(Warmth::DiscoveryOnly, warmth.observe_discovery());

        let warmth = warmth.observe_secrets();
        assert!(warmth.is_warm());
        assert!(warmth.observe_discovery().is_warm());
        assert!(warmth.observe_secrets().is_warm());
    }

    #[test]
    fn warmth_in_either_order() {
        assert!(Warmth::Cold
            .observe_secrets()
            .observe_discovery()
            .is_warm());
        assert!(!Warmth::Cold.observe_secrets().observe_secrets().is_warm());
    }

    #[tokio::test]
    #[traced_test]
    async fn list_failure_is_logged() {
        let client = Arc::new(FakeResourceClient::new(ResourceSnapshot {
            gateways: vec![gateway("default", "gw", &[("http", 8080)])],
            ..<_>::default()
        }));
        client.fail_list(true);
        let mut syncer = XdsSyncer::new(
            SyncerOptions::default(),
            Translator::new(Arc::new(PluginRegistry::default())),
            client.clone(),
            Arc::new(MemorySnapshotCache::new()),
            XdsInputChannels::new(),
        );
        let cancel = CancellationToken::new();

        syncer
            .handle(&cancel, InputEvent::Secrets(SecretInputs::default()))
            .await;
        assert!(logs_contain("inputs not warm"));

        syncer
            .handle(&cancel, InputEvent::Discovery(DiscoveryInputs::default()))
            .await;
        assert!(logs_contain("failed to list resources"));
        assert!(syncer.introspection().keys().is_empty());
    }
}
