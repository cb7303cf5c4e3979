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

use std::{fmt::Debug, sync::Arc};

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::{
    api::core::v1::{Endpoints, Secret as KubeSecret, Service},
    NamespaceResourceScope,
};
use kube::{
    api::{ListParams, Patch, PatchParams},
    runtime::{reflector, watcher, WatchStreamExt},
    Api, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};

use super::{Error, ResourceClient};
use crate::{
    resources::{
        DiscoveryInputs, Endpoint, Gateway, GatewayStatus, ResourceRef, ResourceSnapshot,
        RouteOption, RouteStatus, RouteTable, Secret, SecretInputs, Upstream, VirtualHostOption,
        VirtualService,
    },
    xds::XdsInputChannels,
};

/// Lists routing resources across every namespace and patches their status
/// subresources.
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
}

impl KubeClient {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    async fn list_all<K>(&self) -> Result<Vec<K>, Error>
    where
        K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api = Api::<K>::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn patch_status<K>(&self, object: &K, status: impl Serialize) -> Result<(), Error>
    where
        K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let name = object.name_any();
        let namespace = object.namespace().ok_or_else(|| Error::MissingNamespace {
            kind: K::kind(&()).into_owned(),
            name: name.clone(),
        })?;

        let api = Api::<K>::namespaced(self.client.clone(), &namespace);
        let patch = Patch::Merge(serde_json::json!({ "status": status }));
        api.patch_status(&name, &PatchParams::default(), &patch)
            .await?;
        tracing::trace!(kind = %K::kind(&()), %namespace, %name, "status patched");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceClient for KubeClient {
    async fn list(&self) -> Result<ResourceSnapshot, Error> {
        let (gateways, virtual_services, route_tables, virtual_host_options, route_options) =
            tokio::try_join!(
                self.list_all::<Gateway>(),
                self.list_all::<VirtualService>(),
                self.list_all::<RouteTable>(),
                self.list_all::<VirtualHostOption>(),
                self.list_all::<RouteOption>(),
            )?;

        Ok(ResourceSnapshot {
            gateways,
            virtual_services,
            route_tables,
            virtual_host_options,
            route_options,
        })
    }

    async fn write_gateway_status(
        &self,
        gateway: &Gateway,
        status: GatewayStatus,
    ) -> Result<(), Error> {
        self.patch_status(gateway, status).await
    }

    async fn write_virtual_service_status(
        &self,
        virtual_service: &VirtualService,
        status: RouteStatus,
    ) -> Result<(), Error> {
        self.patch_status(virtual_service, status).await
    }

    async fn write_route_table_status(
        &self,
        route_table: &RouteTable,
        status: RouteStatus,
    ) -> Result<(), Error> {
        self.patch_status(route_table, status).await
    }
}

/// Watches routing resources, services, endpoints and secrets, feeding
/// changes into `inputs` until a watch ends.
pub async fn watch(client: kube::Client, inputs: XdsInputChannels) -> crate::Result<()> {
    tracing::info!("watching kubernetes resources");
    tokio::try_join!(
        kick_on_change::<Gateway>(client.clone(), inputs.clone()),
        kick_on_change::<VirtualService>(client.clone(), inputs.clone()),
        kick_on_change::<RouteTable>(client.clone(), inputs.clone()),
        kick_on_change::<VirtualHostOption>(client.clone(), inputs.clone()),
        kick_on_change::<RouteOption>(client.clone(), inputs.clone()),
        watch_discovery(client.clone(), inputs.clone()),
        watch_secrets(client, inputs),
    )?;
    Ok(())
}

async fn kick_on_change<K>(client: kube::Client, inputs: XdsInputChannels) -> crate::Result<()>
where
    K: kube::Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let kind = K::kind(&());
    let mut events = watcher(Api::<K>::all(client), watcher::Config::default())
        .default_backoff()
        .boxed();

    while events.try_next().await?.is_some() {
        tracing::trace!(%kind, "resource event");
        inputs.kick();
    }

    Err(eyre::eyre!("{kind} watch unexpectedly stopped"))
}

async fn watch_discovery(client: kube::Client, inputs: XdsInputChannels) -> crate::Result<()> {
    let services_writer = reflector::store::Writer::<Service>::default();
    let services = services_writer.as_reader();
    let endpoints_writer = reflector::store::Writer::<Endpoints>::default();
    let endpoints = endpoints_writer.as_reader();

    let service_events = reflector(
        services_writer,
        watcher(Api::<Service>::all(client.clone()), watcher::Config::default())
            .default_backoff(),
    )
    .map_ok(drop);
    let endpoint_events = reflector(
        endpoints_writer,
        watcher(Api::<Endpoints>::all(client), watcher::Config::default()).default_backoff(),
    )
    .map_ok(drop);

    let mut events = futures::stream::select(service_events, endpoint_events).boxed();
    while events.try_next().await?.is_some() {
        let discovered = discovery_inputs(&services.state(), &endpoints.state());
        tracing::trace!(
            upstreams = discovered.upstreams.len(),
            endpoints = discovered.endpoints.len(),
            "discovery updated"
        );
        inputs.update_discovery_inputs(discovered);
    }

    Err(eyre::eyre!("discovery watch unexpectedly stopped"))
}

async fn watch_secrets(client: kube::Client, inputs: XdsInputChannels) -> crate::Result<()> {
    let writer = reflector::store::Writer::<KubeSecret>::default();
    let store = writer.as_reader();
    let mut events = reflector(
        writer,
        watcher(Api::<KubeSecret>::all(client), watcher::Config::default()).default_backoff(),
    )
    .boxed();

    while events.try_next().await?.is_some() {
        inputs.update_secret_inputs(secret_inputs(&store.state()));
    }

    Err(eyre::eyre!("secret watch unexpectedly stopped"))
}

/// One upstream per service, and one endpoint per ready address and port.
fn discovery_inputs(services: &[Arc<Service>], endpoints: &[Arc<Endpoints>]) -> DiscoveryInputs {
    let mut upstreams: Vec<Upstream> = services
        .iter()
        .filter_map(|service| {
            Some(Upstream {
                name: service.metadata.name.clone()?,
                namespace: service.metadata.namespace.clone()?,
                hosts: Vec::new(),
            })
        })
        .collect();
    upstreams.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));

    let mut discovered = Vec::new();
    for object in endpoints {
        let (Some(name), Some(namespace)) = (&object.metadata.name, &object.metadata.namespace)
        else {
            continue;
        };
        let upstream = ResourceRef::new(namespace, name);

        for subset in object.subsets.iter().flatten() {
            for address in subset.addresses.iter().flatten() {
                for port in subset.ports.iter().flatten() {
                    let Ok(port) = u16::try_from(port.port) else {
                        continue;
                    };
                    discovered.push(Endpoint {
                        upstream: upstream.clone(),
                        address: address.ip.clone(),
                        port,
                    });
                }
            }
        }
    }
    discovered.sort_by(|a, b| {
        (&a.upstream, &a.address, a.port).cmp(&(&b.upstream, &b.address, b.port))
    });

    DiscoveryInputs {
        upstreams,
        endpoints: discovered,
    }
}

fn secret_inputs(secrets: &[Arc<KubeSecret>]) -> SecretInputs {
    let mut secrets: Vec<Secret> = secrets
        .iter()
        .filter_map(|secret| {
            Some(Secret {
                name: secret.metadata.name.clone()?,
                namespace: secret.metadata.namespace.clone()?,
                data: secret
                    .data
                    .iter()
                    .flatten()
                    .map(|(key, value)| (key.clone(), String::from_utf8_lossy(&value.0).into_owned()))
                    .collect(),
            })
        })
        .collect();
    secrets.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    SecretInputs { secrets }
}
