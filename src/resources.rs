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

//! The declarative routing resources consumed by the control plane.

mod discovery;
mod gateway;
mod options;
mod route_table;
mod virtual_service;

use std::{any::Any, fmt};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use self::{
    discovery::{DiscoveryInputs, Endpoint, Host, Secret, SecretInputs, Upstream},
    gateway::{Gateway, GatewaySpec, GatewayStatus, Listener, ListenerStatus},
    options::{
        CorsPolicy, ExtAuthExtension, HeaderManipulation, HeaderValue, HeaderValueOption,
        PolicyTargetReference, RetryPolicy, RouteAbort, RouteDelay, RouteFaults, RouteOption,
        RouteOptionSpec, RouteOptions, Shadowing, VirtualHostOption, VirtualHostOptionSpec,
        VirtualHostOptions,
    },
    route_table::{RouteTable, RouteTableSpec},
    virtual_service::{
        filter_type, Action, DelegateOptionsRefs, DirectResponseAction, Filter, HeaderFilter,
        HttpHeader, Matcher, PathMatch, RedirectAction, RequestMirrorFilter,
        RequestRedirectFilter, RouteAction, Rule, UrlRewriteFilter, VirtualHostSpec,
        VirtualService, VirtualServiceSpec,
    },
};

pub(crate) use self::discovery::cluster_name;

/// The API group all of the control plane's custom resources belong to.
pub const GROUP: &str = "gateway.portcullis.dev";

/// A Kubernetes group and kind pair, the discriminator used to select
/// extension plugins.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct GroupKind {
    #[serde(default)]
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }

    /// Returns the group and kind of the statically known resource `K`.
    pub fn of<K: kube::Resource<DynamicType = ()>>() -> Self {
        Self::new(K::group(&()), K::kind(&()))
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// A reference to an object that lives in the same namespace as the object
/// holding the reference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct LocalObjectReference {
    #[serde(default)]
    pub group: String,
    pub kind: String,
    pub name: String,
}

impl LocalObjectReference {
    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(&self.group, &self.kind)
    }
}

/// A reference to a named object, optionally in another namespace.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct ResourceRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// The referenced namespace, or `default` when the reference leaves it
    /// implicit.
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }

    /// Returns a copy of the reference with an implicit namespace made explicit.
    pub fn qualified(&self, default: &str) -> Self {
        Self::new(self.namespace_or(default), &self.name)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Identifies one source resource in reports and status writes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of(object: &dyn KubeObject) -> Self {
        let meta = object.metadata();
        Self::new(
            object.group_kind().kind,
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        )
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.kind, self.namespace, self.name)
    }
}

/// A type erased Kubernetes object, as returned from object lookups and
/// handed to extension plugins.
pub trait KubeObject: Any + fmt::Debug + Send + Sync {
    fn group_kind(&self) -> GroupKind;
    fn metadata(&self) -> &ObjectMeta;
    fn as_any(&self) -> &dyn Any;

    fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }
}

impl<K> KubeObject for K
where
    K: kube::Resource<DynamicType = ()> + fmt::Debug + Send + Sync + 'static,
{
    fn group_kind(&self) -> GroupKind {
        GroupKind::of::<K>()
    }

    fn metadata(&self) -> &ObjectMeta {
        self.meta()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The status of a condition, following the Kubernetes convention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// A single observation written to a resource's status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub r#type: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub const ACCEPTED: &'static str = "Accepted";
    pub const PARTIALLY_INVALID: &'static str = "PartiallyInvalid";

    pub const REASON_ACCEPTED: &'static str = "Accepted";
    pub const REASON_INVALID: &'static str = "Invalid";
    pub const REASON_INCOMPATIBLE_FILTERS: &'static str = "IncompatibleFilters";

    pub fn new(
        r#type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            r#type: r#type.into(),
            status,
            reason: reason.into(),
            message,
        }
    }

    /// The condition attached to a rule whose filters could not all be applied.
    pub fn incompatible_filters(message: impl Into<String>) -> Self {
        Self::new(
            Self::PARTIALLY_INVALID,
            ConditionStatus::True,
            Self::REASON_INCOMPATIBLE_FILTERS,
            Some(message.into()),
        )
    }
}

/// The status written onto routing resources (virtual services and route
/// tables).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reported_by: String,
}

/// A consistent listing of every routing resource, taken at the start of a
/// reconciliation pass.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub gateways: Vec<Gateway>,
    pub virtual_services: Vec<VirtualService>,
    pub route_tables: Vec<RouteTable>,
    pub virtual_host_options: Vec<VirtualHostOption>,
    pub route_options: Vec<RouteOption>,
}

impl ResourceSnapshot {
    /// Keys for every routing resource that receives a status.
    pub fn keys(&self) -> impl Iterator<Item = ResourceKey> + '_ {
        let gateways = self.gateways.iter().map(|gw| ResourceKey::of(gw));
        let virtual_services = self.virtual_services.iter().map(|vs| ResourceKey::of(vs));
        let route_tables = self.route_tables.iter().map(|rt| ResourceKey::of(rt));
        gateways.chain(virtual_services).chain(route_tables)
    }
}
