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

use serde::{Deserialize, Serialize};

use super::ResourceRef;

/// A destination that routes forward traffic to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    pub name: String,
    pub namespace: String,
    /// Statically configured hosts, served alongside discovered endpoints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<Host>,
}

impl Upstream {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(&self.namespace, &self.name)
    }

    /// The name of the cluster generated for this upstream.
    pub fn cluster_name(&self) -> String {
        cluster_name(&self.reference())
    }
}

/// Names the cluster generated for the upstream `reference` points to.
pub(crate) fn cluster_name(reference: &ResourceRef) -> String {
    format!("{}_{}", reference.name, reference.namespace.as_deref().unwrap_or_default())
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub address: String,
    pub port: u16,
}

/// A discovered network endpoint serving an upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub upstream: ResourceRef,
    pub address: String,
    pub port: u16,
}

/// Secret material referenced by proxy configuration. Secret data is never
/// serialized back out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing)]
    pub data: BTreeMap<String, String>,
}

/// Upstreams and endpoints, as produced by service discovery.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryInputs {
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretInputs {
    #[serde(default)]
    pub secrets: Vec<Secret>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_data_is_not_serialized() {
        let secret = Secret {
            name: "tls".into(),
            namespace: "infra".into(),
            data: [("tls.key".to_string(), "hunter2".to_string())].into(),
        };

        let json = serde_json::to_string(&secret).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn cluster_names() {
        let upstream = Upstream {
            name: "petstore".into(),
            namespace: "team-a".into(),
            hosts: Vec::new(),
        };
        assert_eq!("petstore_team-a", upstream.cluster_name());
    }
}
