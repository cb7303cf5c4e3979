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

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Condition, VirtualService};

/// A gateway declares the listeners a proxy exposes and selects the virtual
/// services that are served on them.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.portcullis.dev",
    version = "v1",
    kind = "Gateway",
    namespaced,
    status = "GatewayStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    #[serde(default)]
    pub listeners: Vec<Listener>,
    /// Labels a virtual service must carry to be served by this gateway. An
    /// empty selector selects every virtual service in scope.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub virtual_service_selector: BTreeMap<String, String>,
    /// Namespaces searched for virtual services. Empty means the gateway's
    /// own namespace and `*` means all namespaces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_service_namespaces: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    pub bind_port: u16,
}

fn default_bind_address() -> String {
    "::".into()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<ListenerStatus>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reported_by: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    pub name: String,
    pub attached_virtual_hosts: u32,
}

impl Gateway {
    /// Whether `virtual_service` is in scope of this gateway and matches its
    /// label selector.
    pub fn selects(&self, virtual_service: &VirtualService) -> bool {
        let own_namespace = self.namespace().unwrap_or_default();
        let vs_namespace = virtual_service.namespace().unwrap_or_default();

        let namespaces = &self.spec.virtual_service_namespaces;
        let in_scope = if namespaces.is_empty() {
            own_namespace == vs_namespace
        } else {
            namespaces.iter().any(|ns| ns == "*" || *ns == vs_namespace)
        };

        let labels = virtual_service.labels();
        in_scope
            && self
                .spec
                .virtual_service_selector
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value))
    }
}
