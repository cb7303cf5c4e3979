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

//! Plugins that translate rule filters and extension objects into proxy
//! configuration.

mod error;
mod registry;

pub mod extension_ref;
pub mod header_modifier;
pub mod mirror;
pub mod redirect;
pub mod route_options;
pub mod url_rewrite;
pub mod virtual_host_options;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    proxy::{Route, VirtualHost},
    query::ObjectQuery,
    reports::ResourceReport,
    resources::{Filter, GroupKind, KubeObject, Rule},
};

#[doc(inline)]
pub use self::{
    error::Error,
    extension_ref::ExtensionRef,
    header_modifier::HeaderModifier,
    mirror::RequestMirror,
    redirect::RequestRedirect,
    registry::{ExtensionRegistry, PluginRegistry},
    route_options::RouteOptionPlugin,
    url_rewrite::UrlRewrite,
    virtual_host_options::VirtualHostOptionPlugin,
};

pub type DynFilterPlugin = Arc<dyn FilterPlugin>;
pub type DynExtensionPlugin = Arc<dyn ExtensionPlugin>;

/// Everything a filter plugin may consult while translating one rule.
pub struct RouteContext<'a> {
    /// The virtual service or route table the rule was declared in.
    pub source: &'a dyn KubeObject,
    pub rule: &'a Rule,
    pub query: &'a dyn ObjectQuery,
    /// The report of `source`, where failures are recorded.
    pub reporter: &'a mut ResourceReport,
}

/// The output object an extension plugin is applied to.
#[derive(Debug)]
pub enum ExtensionTarget<'a> {
    Route(&'a mut Route),
    VirtualHost(&'a mut VirtualHost),
}

impl ExtensionTarget<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Route(_) => "route",
            Self::VirtualHost(_) => "virtual host",
        }
    }
}

/// Applies one type of rule filter to the output route.
pub trait FilterPlugin: Send + Sync {
    /// The filter type this plugin handles, as written in a filter's `type`.
    fn filter_type(&self) -> &'static str;

    /// Mutates `output` according to `filter`. On error the output may have
    /// been partially modified.
    fn apply_filter(
        &self,
        cancel: &CancellationToken,
        ctx: &RouteContext<'_>,
        filter: &Filter,
        output: &mut Route,
    ) -> Result<(), Error>;
}

/// Applies objects of one resource kind to output routes or virtual hosts.
pub trait ExtensionPlugin: Send + Sync {
    fn group_kind(&self) -> GroupKind;

    fn apply_ext_plugin(
        &self,
        cancel: &CancellationToken,
        object: &dyn KubeObject,
        output: ExtensionTarget<'_>,
    ) -> Result<(), Error>;
}

/// Shared by the standard plugins: confirms `filter` carries the type the
/// plugin handles.
pub(crate) fn check_filter_type(plugin: &dyn FilterPlugin, filter: &Filter) -> Result<(), Error> {
    if filter.r#type == plugin.filter_type() {
        Ok(())
    } else {
        Err(Error::UnsupportedFilterType(filter.r#type.clone()))
    }
}

/// Downcasts `object` to the kind an extension plugin handles.
pub(crate) fn downcast_object<'a, K>(object: &'a dyn KubeObject) -> Result<&'a K, Error>
where
    K: KubeObject + kube::Resource<DynamicType = ()>,
{
    object.as_any().downcast_ref::<K>().ok_or_else(|| {
        let error = Error::MismatchedTypes {
            expected: GroupKind::of::<K>(),
            actual: object.group_kind(),
        };
        tracing::error!(%error, "extension plugin received an object of the wrong kind");
        error
    })
}
