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

use std::{collections::HashMap, iter::FromIterator, sync::Arc};

use crate::{
    plugins::{self, DynExtensionPlugin, DynFilterPlugin, Error, FilterPlugin},
    resources::GroupKind,
};

/// Extension plugins keyed by the group and kind of object they apply.
#[derive(Clone)]
pub struct ExtensionRegistry(HashMap<GroupKind, DynExtensionPlugin>);

impl ExtensionRegistry {
    /// Returns a registry holding the built-in extension plugins:
    /// - [`RouteOptionPlugin`][plugins::RouteOptionPlugin]
    /// - [`VirtualHostOptionPlugin`][plugins::VirtualHostOptionPlugin]
    pub fn default_with(plugins: impl IntoIterator<Item = DynExtensionPlugin>) -> Self {
        Self::with(
            [
                Arc::new(plugins::RouteOptionPlugin) as DynExtensionPlugin,
                Arc::new(plugins::VirtualHostOptionPlugin),
            ]
            .into_iter()
            .chain(plugins),
        )
    }

    /// Creates a registry holding exactly `plugins`. Later plugins replace
    /// earlier ones registered for the same group and kind.
    pub fn with(plugins: impl IntoIterator<Item = DynExtensionPlugin>) -> Self {
        Self::from_iter(plugins)
    }

    pub fn get(&self, group_kind: &GroupKind) -> Result<DynExtensionPlugin, Error> {
        self.0
            .get(group_kind)
            .cloned()
            .ok_or_else(|| Error::ExtensionNotFound(group_kind.clone()))
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::default_with(None)
    }
}

impl FromIterator<DynExtensionPlugin> for ExtensionRegistry {
    fn from_iter<I: IntoIterator<Item = DynExtensionPlugin>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|plugin| (plugin.group_kind(), plugin))
                .collect(),
        )
    }
}

/// The plugins available to translation: standard filter plugins keyed by
/// filter type, and extension plugins keyed by group and kind.
///
/// The registry is built once and only read afterwards, so it can be shared
/// freely between passes.
#[derive(Clone)]
pub struct PluginRegistry {
    standard: HashMap<&'static str, DynFilterPlugin>,
    extensions: Arc<ExtensionRegistry>,
}

impl PluginRegistry {
    /// Returns a registry with the standard filter plugins and `extensions`.
    ///
    /// Current standard plugins:
    /// - [`HeaderModifier`][plugins::HeaderModifier] for request and response headers
    /// - [`UrlRewrite`][plugins::UrlRewrite]
    /// - [`RequestRedirect`][plugins::RequestRedirect]
    /// - [`RequestMirror`][plugins::RequestMirror]
    /// - [`ExtensionRef`][plugins::ExtensionRef], resolving through `extensions`
    pub fn new(extensions: ExtensionRegistry) -> Self {
        let extensions = Arc::new(extensions);
        let lookup = extensions.clone();
        let standard = [
            Arc::new(plugins::HeaderModifier::request()) as DynFilterPlugin,
            Arc::new(plugins::HeaderModifier::response()),
            Arc::new(plugins::UrlRewrite),
            Arc::new(plugins::RequestRedirect),
            Arc::new(plugins::RequestMirror),
            Arc::new(plugins::ExtensionRef::new(Arc::new(move |gk: &GroupKind| {
                lookup.get(gk)
            }))),
        ];

        Self::with(standard, extensions)
    }

    /// Creates a registry from exactly the given plugins.
    pub fn with(
        standard: impl IntoIterator<Item = DynFilterPlugin>,
        extensions: Arc<ExtensionRegistry>,
    ) -> Self {
        Self {
            standard: standard
                .into_iter()
                .map(|plugin| (plugin.filter_type(), plugin))
                .collect(),
            extensions,
        }
    }

    pub fn get_standard_plugin(&self, filter_type: &str) -> Result<&dyn FilterPlugin, Error> {
        self.standard
            .get(filter_type)
            .map(|plugin| &**plugin)
            .ok_or_else(|| Error::FilterNotFound(filter_type.to_owned()))
    }

    pub fn get_extension_plugin(
        &self,
        group_kind: &GroupKind,
    ) -> Result<DynExtensionPlugin, Error> {
        self.extensions.get(group_kind)
    }

    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new(ExtensionRegistry::default())
    }
}
