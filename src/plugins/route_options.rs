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

use tokio_util::sync::CancellationToken;

use crate::{
    plugins::{downcast_object, Error, ExtensionPlugin, ExtensionTarget},
    resources::{GroupKind, KubeObject, RouteOption},
};

/// Applies [`RouteOption`] objects to routes. A route option carrying a
/// payload replaces the route's options wholesale. Upstreams without a
/// namespace resolve in the route option's namespace.
#[derive(Debug)]
pub struct RouteOptionPlugin;

impl ExtensionPlugin for RouteOptionPlugin {
    fn group_kind(&self) -> GroupKind {
        GroupKind::of::<RouteOption>()
    }

    fn apply_ext_plugin(
        &self,
        cancel: &CancellationToken,
        object: &dyn KubeObject,
        output: ExtensionTarget<'_>,
    ) -> Result<(), Error> {
        let route_option = downcast_object::<RouteOption>(object)?;
        let target = output.kind();
        let ExtensionTarget::Route(route) = output else {
            return Err(Error::UnsupportedTarget {
                kind: self.group_kind(),
                target,
            });
        };

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(options) = &route_option.spec.options {
            let mut options = options.clone();
            if let Some(shadowing) = &mut options.shadowing {
                shadowing.upstream = shadowing.upstream.qualified(object.namespace());
            }
            route.options = Some(options);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        proxy::{Route, VirtualHost},
        resources::{
            ResourceRef, RouteOptionSpec, RouteOptions, Shadowing, VirtualHostOption,
            VirtualHostOptionSpec,
        },
        test::namespaced,
    };

    fn route_option(options: Option<RouteOptions>) -> RouteOption {
        RouteOption::new("policy", RouteOptionSpec { options })
    }

    fn timeout(value: &str) -> RouteOptions {
        RouteOptions {
            timeout: Some(value.into()),
            ..<_>::default()
        }
    }

    #[test]
    fn replaces_route_options() {
        let mut route = Route::default();
        route.options_mut().shadowing = Some(Shadowing {
            upstream: ResourceRef::new("default", "shadow"),
        });

        RouteOptionPlugin
            .apply_ext_plugin(
                &CancellationToken::new(),
                &route_option(Some(timeout("5s"))),
                ExtensionTarget::Route(&mut route),
            )
            .unwrap();

        assert_eq!(Some(timeout("5s")), route.options);
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let option = route_option(Some(timeout("5s")));
        let mut once = Route::default();
        RouteOptionPlugin
            .apply_ext_plugin(
                &CancellationToken::new(),
                &option,
                ExtensionTarget::Route(&mut once),
            )
            .unwrap();

        let mut twice = once.clone();
        RouteOptionPlugin
            .apply_ext_plugin(
                &CancellationToken::new(),
                &option,
                ExtensionTarget::Route(&mut twice),
            )
            .unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn mirror_upstream_resolves_in_option_namespace() {
        let mirror = |namespace: Option<&str>| RouteOptions {
            shadowing: Some(Shadowing {
                upstream: ResourceRef {
                    name: "mirror".into(),
                    namespace: namespace.map(Into::into),
                },
            }),
            ..<_>::default()
        };
        let mut route = Route::default();

        RouteOptionPlugin
            .apply_ext_plugin(
                &CancellationToken::new(),
                &namespaced(route_option(Some(mirror(None))), "default"),
                ExtensionTarget::Route(&mut route),
            )
            .unwrap();
        assert_eq!(Some(mirror(Some("default"))), route.options);

        RouteOptionPlugin
            .apply_ext_plugin(
                &CancellationToken::new(),
                &namespaced(route_option(Some(mirror(Some("shared")))), "default"),
                ExtensionTarget::Route(&mut route),
            )
            .unwrap();
        assert_eq!(Some(mirror(Some("shared"))), route.options);
    }

    #[test]
    fn empty_payload_leaves_route_untouched() {
        let mut route = Route::default();
        route.options = Some(timeout("1s"));

        RouteOptionPlugin
            .apply_ext_plugin(
                &CancellationToken::new(),
                &route_option(None),
                ExtensionTarget::Route(&mut route),
            )
            .unwrap();

        assert_eq!(Some(timeout("1s")), route.options);
    }

    #[test]
    fn rejects_other_kinds() {
        let mut route = Route::default();
        let error = RouteOptionPlugin
            .apply_ext_plugin(
                &CancellationToken::new(),
                &VirtualHostOption::new("policy", VirtualHostOptionSpec::default()),
                ExtensionTarget::Route(&mut route),
            )
            .unwrap_err();

        assert_eq!(
            Error::MismatchedTypes {
                expected: GroupKind::of::<RouteOption>(),
                actual: GroupKind::of::<VirtualHostOption>(),
            },
            error
        );
        assert_eq!(Route::default(), route);
    }

    #[test]
    fn rejects_virtual_host_targets() {
        let mut host = VirtualHost::default();
        let error = RouteOptionPlugin
            .apply_ext_plugin(
                &CancellationToken::new(),
                &route_option(Some(timeout("5s"))),
                ExtensionTarget::VirtualHost(&mut host),
            )
            .unwrap_err();

        assert!(matches!(error, Error::UnsupportedTarget { .. }));
        assert_eq!(VirtualHost::default(), host);
    }
}
