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

//! Dispatches `ExtensionRef` filters to the extension plugin for the
//! referenced object's kind.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    plugins::{
        check_filter_type, DynExtensionPlugin, Error, ExtensionTarget, FilterPlugin, RouteContext,
    },
    proxy::Route,
    resources::{filter_type, Filter, GroupKind},
};

/// Looks up the extension plugin registered for a group and kind.
pub type GetExtensionPlugin =
    Arc<dyn Fn(&GroupKind) -> Result<DynExtensionPlugin, Error> + Send + Sync>;

pub struct ExtensionRef {
    get_plugin: GetExtensionPlugin,
}

impl ExtensionRef {
    pub fn new(get_plugin: GetExtensionPlugin) -> Self {
        Self { get_plugin }
    }
}

impl FilterPlugin for ExtensionRef {
    fn filter_type(&self) -> &'static str {
        filter_type::EXTENSION_REF
    }

    fn apply_filter(
        &self,
        cancel: &CancellationToken,
        ctx: &RouteContext<'_>,
        filter: &Filter,
        output: &mut Route,
    ) -> Result<(), Error> {
        check_filter_type(self, filter)?;

        let reference = filter
            .extension_ref
            .as_ref()
            .filter(|reference| !reference.name.is_empty())
            .ok_or(Error::MissingReference(filter_type::EXTENSION_REF))?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let object = ctx.query.get_local_object(ctx.source, reference)?;
        let plugin = (self.get_plugin)(&object.group_kind())?;

        tracing::trace!(
            kind = %object.group_kind(),
            name = object.name(),
            "applying extension object to route"
        );
        plugin.apply_ext_plugin(cancel, &*object, ExtensionTarget::Route(output))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        plugins::PluginRegistry,
        query::{QueryError, ResourceIndex},
        reports::ResourceReport,
        resources::{
            KubeObject, LocalObjectReference, ResourceSnapshot, RouteOption, RouteOptionSpec,
            RouteOptions, Rule, VirtualService, VirtualServiceSpec, GROUP,
        },
        test::namespaced,
    };

    fn index() -> ResourceIndex {
        ResourceIndex::new(&ResourceSnapshot {
            virtual_services: vec![namespaced(
                VirtualService::new("vs", VirtualServiceSpec::default()),
                "team-a",
            )],
            route_options: vec![
                namespaced(
                    RouteOption::new(
                        "timeout",
                        RouteOptionSpec {
                            options: Some(RouteOptions {
                                timeout: Some("5s".into()),
                                ..<_>::default()
                            }),
                        },
                    ),
                    "team-a",
                ),
                namespaced(
                    RouteOption::new("elsewhere", RouteOptionSpec::default()),
                    "team-b",
                ),
            ],
            ..<_>::default()
        })
    }

    fn reference(kind: &str, name: &str) -> LocalObjectReference {
        LocalObjectReference {
            group: GROUP.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    fn apply(filter: &Filter, output: &mut Route) -> Result<(), Error> {
        let index = index();
        let source = index.get::<VirtualService>("team-a", "vs").unwrap();
        let rule = Rule::default();
        let mut report = ResourceReport::default();
        let ctx = RouteContext {
            source: source as &dyn KubeObject,
            rule: &rule,
            query: &index,
            reporter: &mut report,
        };

        PluginRegistry::default()
            .get_standard_plugin(filter_type::EXTENSION_REF)?
            .apply_filter(&CancellationToken::new(), &ctx, filter, output)
    }

    #[test]
    fn applies_route_option() {
        let mut route = Route::default();
        apply(
            &Filter::extension_ref(reference("RouteOption", "timeout")),
            &mut route,
        )
        .unwrap();

        assert_eq!(Some("5s"), route.options.unwrap().timeout.as_deref());
    }

    #[test]
    fn rejects_other_filter_types() {
        let filter = Filter {
            r#type: filter_type::URL_REWRITE.into(),
            ..Filter::extension_ref(reference("RouteOption", "timeout"))
        };
        assert_eq!(
            Error::UnsupportedFilterType(filter_type::URL_REWRITE.into()),
            apply(&filter, &mut Route::default()).unwrap_err()
        );
    }

    #[test]
    fn requires_a_reference() {
        let filter = Filter {
            r#type: filter_type::EXTENSION_REF.into(),
            ..<_>::default()
        };
        assert_eq!(
            Error::MissingReference(filter_type::EXTENSION_REF),
            apply(&filter, &mut Route::default()).unwrap_err()
        );
    }

    #[test]
    fn does_not_resolve_across_namespaces() {
        let mut route = Route::default();
        let error = apply(
            &Filter::extension_ref(reference("RouteOption", "elsewhere")),
            &mut route,
        )
        .unwrap_err();

        assert_eq!(
            Error::Query(QueryError::NotFound {
                group_kind: GroupKind::of::<RouteOption>(),
                namespace: "team-a".into(),
                name: "elsewhere".into(),
            }),
            error
        );
        assert_eq!(Route::default(), route);
    }

    #[test]
    fn unknown_extension_kind() {
        let mut index = index();
        index.insert(namespaced(
            crate::resources::Gateway::new("gw", <_>::default()),
            "team-a",
        ));
        let source = index.get::<VirtualService>("team-a", "vs").unwrap();
        let rule = Rule::default();
        let mut report = ResourceReport::default();
        let ctx = RouteContext {
            source,
            rule: &rule,
            query: &index,
            reporter: &mut report,
        };

        let error = PluginRegistry::default()
            .get_standard_plugin(filter_type::EXTENSION_REF)
            .unwrap()
            .apply_filter(
                &CancellationToken::new(),
                &ctx,
                &Filter::extension_ref(reference("Gateway", "gw")),
                &mut Route::default(),
            )
            .unwrap_err();

        assert_eq!(
            Error::ExtensionNotFound(GroupKind::new(GROUP, "Gateway")),
            error
        );
    }
}
