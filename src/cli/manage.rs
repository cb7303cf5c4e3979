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

use std::{sync::Arc, time::Duration};

use crate::{
    config::{Provider, Settings},
    plugins::PluginRegistry,
    providers::{self, ResourceClient},
    translator::Translator,
    xds::{MemorySnapshotCache, SyncerOptions, XdsInputChannels, XdsSyncer},
};

const KUBE_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the control plane: watches the configured provider, reconciles its
/// resources into proxy snapshots and serves the admin endpoints.
#[derive(clap::Args, Clone, Debug)]
pub struct Manage {
    /// Disables the admin server.
    #[clap(long, env = "PORTCULLIS_NO_ADMIN")]
    pub no_admin: bool,
}

impl Manage {
    pub async fn manage(&self, settings: Settings) -> crate::Result<()> {
        let shutdown = crate::signal::spawn_handler()?;
        let inputs = XdsInputChannels::new();

        let (client, provider_task) = match &settings.provider {
            Provider::File { path } => {
                let client: Arc<dyn ResourceClient> =
                    Arc::new(providers::fs::FileResources::new(path.clone()));
                let path = path.clone();
                let inputs = inputs.clone();
                let task = tokio::spawn(providers::retry("fs", move || {
                    providers::fs::watch(path.clone(), inputs.clone())
                }));
                (client, task)
            }
            Provider::Kubernetes => {
                let client = tokio::time::timeout(KUBE_CLIENT_TIMEOUT, kube::Client::try_default())
                    .await
                    .map_err(|_| eyre::eyre!("timed out creating kubernetes client"))??;
                let watch_client = client.clone();
                let inputs = inputs.clone();
                let task = tokio::spawn(providers::retry("k8s", move || {
                    providers::k8s::watch(watch_client.clone(), inputs.clone())
                }));
                let client: Arc<dyn ResourceClient> =
                    Arc::new(providers::k8s::KubeClient::new(client));
                (client, task)
            }
        };

        let syncer = XdsSyncer::new(
            SyncerOptions {
                controller_name: settings.controller_name.clone(),
                garbage_collection: settings.xds.garbage_collection,
            },
            Translator::new(Arc::new(PluginRegistry::default())),
            client,
            Arc::new(MemorySnapshotCache::new()),
            inputs,
        );

        let admin_task = if self.no_admin {
            None
        } else {
            Some(crate::admin::server(
                syncer.introspection(),
                crate::admin::Health::new(shutdown.clone()),
                settings.admin.address,
                shutdown.clone(),
            )?)
        };

        let syncer_task = syncer.spawn(shutdown.clone())?;

        tokio::select! {
            result = provider_task => {
                shutdown.cancel();
                result??;
            }
            _ = shutdown.cancelled() => {}
        }

        join_thread("xds-syncer", syncer_task)?;
        if let Some(admin_task) = admin_task {
            join_thread("admin-http", admin_task)?;
        }
        Ok(())
    }
}

fn join_thread(
    name: &str,
    handle: std::thread::JoinHandle<crate::Result<()>>,
) -> crate::Result<()> {
    handle
        .join()
        .map_err(|_| eyre::eyre!("{name} thread panicked"))?
}
