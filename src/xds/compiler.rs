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

use std::collections::{BTreeMap, BTreeSet};

use enum_map::EnumMap;
use serde_json::{json, Value};

use super::{ApiSnapshot, ResourceType, Snapshot};
use crate::{
    proxy::{Action, Proxy},
    reports::ReportMap,
    resources::ResourceRef,
};

/// Compiles a proxy into proxy configuration resources.
pub trait ConfigCompiler: Send + Sync {
    /// Produces the snapshot for `proxy`. Problems are reported against
    /// [`Proxy::source_key`].
    fn compile(&self, input: &ApiSnapshot, proxy: &Proxy, reports: &mut ReportMap) -> Snapshot;
}

/// Emits one listener and route configuration per proxy listener, and one
/// cluster with its endpoints per referenced upstream.
#[derive(Debug, Default)]
pub struct BasicCompiler;

impl ConfigCompiler for BasicCompiler {
    fn compile(&self, input: &ApiSnapshot, proxy: &Proxy, reports: &mut ReportMap) -> Snapshot {
        let key = proxy.source_key();
        let mut resources: EnumMap<ResourceType, BTreeMap<String, Value>> = EnumMap::default();

        for listener in &proxy.listeners {
            resources[ResourceType::Listener].insert(
                listener.name.clone(),
                json!({
                    "name": listener.name,
                    "address": listener.bind_address,
                    "port": listener.bind_port,
                    "routeConfigName": listener.name,
                }),
            );

            match serde_json::to_value(&listener.virtual_hosts) {
                Ok(virtual_hosts) => {
                    resources[ResourceType::Route].insert(
                        listener.name.clone(),
                        json!({ "name": listener.name, "virtualHosts": virtual_hosts }),
                    );
                }
                Err(error) => reports.add_error(
                    &key,
                    format!("failed to encode routes of listener {}: {error}", listener.name),
                ),
            }
        }

        for upstream in referenced_upstreams(proxy) {
            let Some(found) = input
                .upstreams
                .iter()
                .find(|candidate| candidate.reference() == upstream)
            else {
                reports.add_error(&key, format!("upstream {upstream} not found"));
                continue;
            };

            let name = found.cluster_name();
            let endpoints: Vec<Value> = found
                .hosts
                .iter()
                .map(|host| json!({ "address": host.address, "port": host.port }))
                .chain(
                    input
                        .endpoints
                        .iter()
                        .filter(|endpoint| endpoint.upstream == upstream)
                        .map(|endpoint| json!({ "address": endpoint.address, "port": endpoint.port })),
                )
                .collect();

            resources[ResourceType::Cluster].insert(
                name.clone(),
                json!({ "name": name, "type": "EDS" }),
            );
            resources[ResourceType::Endpoint].insert(
                name.clone(),
                json!({ "clusterName": name, "endpoints": endpoints }),
            );
        }

        Snapshot::new(resources)
    }
}

/// Every upstream routed or mirrored to by `proxy`, with explicit
/// namespaces.
fn referenced_upstreams(proxy: &Proxy) -> BTreeSet<ResourceRef> {
    let mut upstreams = BTreeSet::new();
    for route in proxy.routes() {
        if let Some(Action::Route(action)) = &route.action {
            upstreams.insert(action.upstream.qualified(&proxy.namespace));
        }
        if let Some(shadowing) = route.options.as_ref().and_then(|o| o.shadowing.as_ref()) {
            upstreams.insert(shadowing.upstream.qualified(&proxy.namespace));
        }
    }
    upstreams
}
