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

use std::{collections::BTreeMap, fmt, hash::Hasher};

use enum_map::{Enum, EnumMap};
use serde::Serialize;
use serde_json::{json, Value};

/// The version carried by every resource set of an empty snapshot.
pub const EMPTY_VERSION: &str = "empty";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Enum, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    Cluster,
    Endpoint,
    Listener,
    Route,
}

impl ResourceType {
    pub const VARIANTS: &'static [Self] = &[Self::Cluster, Self::Endpoint, Self::Listener, Self::Route];

    pub fn type_url(self) -> &'static str {
        match self {
            Self::Cluster => "type.googleapis.com/envoy.config.cluster.v3.Cluster",
            Self::Endpoint => {
                "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment"
            }
            Self::Listener => "type.googleapis.com/envoy.config.listener.v3.Listener",
            Self::Route => "type.googleapis.com/envoy.config.route.v3.RouteConfiguration",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cluster => "cluster",
            Self::Endpoint => "endpoint",
            Self::Listener => "listener",
            Self::Route => "route",
        })
    }
}

/// The named resources of one type, with a version derived from their
/// content.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Resources {
    version: String,
    items: BTreeMap<String, Value>,
}

impl Default for Resources {
    fn default() -> Self {
        Self::empty()
    }
}

impl Resources {
    pub fn new(items: BTreeMap<String, Value>) -> Self {
        Self {
            version: content_version(&items),
            items,
        }
    }

    pub fn empty() -> Self {
        Self {
            version: EMPTY_VERSION.into(),
            items: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn items(&self) -> &BTreeMap<String, Value> {
        &self.items
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.items.get(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Hashes the canonical JSON of `items`. Object keys are always sorted, so
/// equal content always produces an equal version.
fn content_version(items: &BTreeMap<String, Value>) -> String {
    let mut hasher = seahash::SeaHasher::new();
    for (name, item) in items {
        hasher.write(name.as_bytes());
        hasher.write(item.to_string().as_bytes());
    }
    format!("{:016x}", hasher.finish())
}

/// A complete, versioned set of proxy resources for one node.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Snapshot {
    resources: EnumMap<ResourceType, Resources>,
}

impl Snapshot {
    pub fn new(resources: EnumMap<ResourceType, BTreeMap<String, Value>>) -> Self {
        Self {
            resources: resources.map(|_, items| Resources::new(items)),
        }
    }

    /// A snapshot holding no resources, versioned [`EMPTY_VERSION`].
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn resources(&self, ty: ResourceType) -> &Resources {
        &self.resources[ty]
    }

    pub fn is_empty(&self) -> bool {
        self.resources.values().all(Resources::is_empty)
    }

    /// Modifies the items of `ty`, recomputing its version afterwards.
    pub fn update(&mut self, ty: ResourceType, f: impl FnOnce(&mut BTreeMap<String, Value>)) {
        let mut items = std::mem::take(&mut self.resources[ty].items);
        f(&mut items);
        self.resources[ty] = Resources::new(items);
    }

    fn missing_endpoints(&self) -> Vec<String> {
        let endpoints = &self.resources[ResourceType::Endpoint];
        self.resources[ResourceType::Cluster]
            .items
            .keys()
            .filter(|name| !endpoints.items.contains_key(*name))
            .cloned()
            .collect()
    }

    fn missing_routes(&self) -> Vec<String> {
        let routes = &self.resources[ResourceType::Route];
        self.resources[ResourceType::Listener]
            .items
            .values()
            .filter_map(|listener| listener.get("routeConfigName").and_then(Value::as_str))
            .filter(|name| !routes.items.contains_key(*name))
            .map(String::from)
            .collect()
    }

    /// Whether every cluster has an endpoint set and every listener's route
    /// configuration exists.
    pub fn is_consistent(&self) -> bool {
        self.missing_endpoints().is_empty() && self.missing_routes().is_empty()
    }

    /// Adds empty endpoint sets and route configurations for every cluster
    /// and listener missing them.
    pub fn make_consistent(&mut self) {
        let endpoints = self.missing_endpoints();
        if !endpoints.is_empty() {
            self.update(ResourceType::Endpoint, |items| {
                for name in endpoints {
                    let assignment = json!({ "clusterName": name, "endpoints": [] });
                    items.insert(name, assignment);
                }
            });
        }

        let routes = self.missing_routes();
        if !routes.is_empty() {
            self.update(ResourceType::Route, |items| {
                for name in routes {
                    let config = json!({ "name": name, "virtualHosts": [] });
                    items.insert(name, config);
                }
            });
        }
    }
}
