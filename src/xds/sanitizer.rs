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

use serde_json::Value;

use super::{ApiSnapshot, ResourceType, Snapshot};
use crate::{
    proxy::{Action, Proxy, VirtualHost},
    reports::ReportMap,
    resources::{cluster_name, DirectResponseAction, ResourceRef},
};

/// Post-processes a compiled snapshot before it is published.
pub trait Sanitizer: Send + Sync {
    fn sanitize(
        &self,
        input: &ApiSnapshot,
        proxy: &Proxy,
        snapshot: Snapshot,
        reports: &mut ReportMap,
    ) -> Snapshot;
}

/// Leaves snapshots untouched.
#[derive(Debug, Default)]
pub struct NoopSanitizer;

impl Sanitizer for NoopSanitizer {
    fn sanitize(
        &self,
        _: &ApiSnapshot,
        _: &Proxy,
        snapshot: Snapshot,
        _: &mut ReportMap,
    ) -> Snapshot {
        snapshot
    }
}

/// Replaces the action of every route pointing at a cluster missing from the
/// snapshot with a fixed direct response, and drops mirrors to missing
/// clusters, so proxies never receive routes to nowhere.
#[derive(Debug)]
pub struct RouteReplacingSanitizer {
    status: u32,
    body: String,
}

impl RouteReplacingSanitizer {
    pub fn new(status: u32, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns the number of routes changed. Upstreams without a namespace
    /// resolve in `namespace`.
    fn sanitize_hosts(
        &self,
        snapshot: &Snapshot,
        namespace: &str,
        hosts: &mut [VirtualHost],
    ) -> usize {
        let clusters = snapshot.resources(ResourceType::Cluster);
        let missing = |upstream: &ResourceRef| {
            !clusters
                .items()
                .contains_key(&cluster_name(&upstream.qualified(namespace)))
        };

        let mut replaced = 0;
        for route in hosts.iter_mut().flat_map(|host| &mut host.routes) {
            if let Some(Action::Route(action)) = &route.action {
                if missing(&action.upstream) {
                    route.action = Some(Action::DirectResponse(DirectResponseAction {
                        status: self.status,
                        body: Some(self.body.clone()),
                    }));
                    replaced += 1;
                }
            }

            if let Some(options) = &mut route.options {
                if options
                    .shadowing
                    .as_ref()
                    .map_or(false, |shadowing| missing(&shadowing.upstream))
                {
                    options.shadowing = None;
                    replaced += 1;
                }
            }
        }
        replaced
    }
}

impl Default for RouteReplacingSanitizer {
    fn default() -> Self {
        Self::new(404, "invalid route configuration")
    }
}

impl Sanitizer for RouteReplacingSanitizer {
    fn sanitize(
        &self,
        _: &ApiSnapshot,
        proxy: &Proxy,
        mut snapshot: Snapshot,
        reports: &mut ReportMap,
    ) -> Snapshot {
        let mut sanitized = Vec::new();
        for (name, config) in snapshot.resources(ResourceType::Route).items() {
            let Some(hosts) = config.get("virtualHosts") else {
                continue;
            };
            let mut hosts: Vec<VirtualHost> = match serde_json::from_value(hosts.clone()) {
                Ok(hosts) => hosts,
                Err(error) => {
                    tracing::warn!(
                        %error,
                        route_config = name,
                        "failed to decode route configuration"
                    );
                    continue;
                }
            };

            let replaced = self.sanitize_hosts(&snapshot, &proxy.namespace, &mut hosts);
            if replaced > 0 {
                sanitized.push((name.clone(), config.clone(), hosts, replaced));
            }
        }

        if sanitized.is_empty() {
            return snapshot;
        }

        let key = proxy.source_key();
        snapshot.update(ResourceType::Route, |items| {
            for (name, mut config, hosts, replaced) in sanitized {
                match serde_json::to_value(hosts) {
                    Ok(hosts) => {
                        if let Value::Object(config) = &mut config {
                            config.insert("virtualHosts".into(), hosts);
                        }
                        reports.add_warning(
                            &key,
                            format!("{replaced} route(s) in {name} point at missing upstreams"),
                        );
                        items.insert(name, config);
                    }
                    Err(error) => {
                        reports.add_error(
                            &key,
                            format!("failed to encode routes of {name}: {error}"),
                        );
                    }
                }
            }
        });
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use enum_map::enum_map;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{
        proxy::Route,
        resources::{RouteAction, RouteOptions, Shadowing},
    };

    fn proxy() -> Proxy {
        Proxy {
            name: "gw".into(),
            namespace: "default".into(),
            listeners: Vec::new(),
        }
    }

    fn route_to(upstream: &str) -> Route {
        Route {
            action: Some(Action::Route(RouteAction {
                upstream: ResourceRef::new("default", upstream),
            })),
            ..<_>::default()
        }
    }

    fn snapshot() -> Snapshot {
        let hosts = vec![VirtualHost {
            name: "default.vs".into(),
            routes: vec![route_to("petstore"), route_to("missing")],
            ..<_>::default()
        }];
        Snapshot::new(enum_map! {
            ResourceType::Cluster => [(
                "petstore_default".to_string(),
                json!({ "name": "petstore_default" }),
            )]
            .into(),
            ResourceType::Route => [(
                "http".to_string(),
                json!({ "name": "http", "virtualHosts": hosts }),
            )]
            .into(),
            _ => Default::default(),
        })
    }

    #[test]
    fn replaces_routes_to_missing_clusters() {
        let mut reports = ReportMap::new();
        let sanitized = RouteReplacingSanitizer::default().sanitize(
            &ApiSnapshot::default(),
            &proxy(),
            snapshot(),
            &mut reports,
        );

        let hosts: Vec<VirtualHost> = serde_json::from_value(
            sanitized.resources(ResourceType::Route).get("http").unwrap()["virtualHosts"].clone(),
        )
        .unwrap();
        assert_eq!(route_to("petstore"), hosts[0].routes[0]);
        assert_eq!(
            Some(Action::DirectResponse(DirectResponseAction {
                status: 404,
                body: Some("invalid route configuration".into()),
            })),
            hosts[0].routes[1].action
        );
        assert_eq!(
            1,
            reports.get(&proxy().source_key()).unwrap().warnings.len()
        );
    }

    #[test]
    fn mirrors_resolve_in_the_proxy_namespace() {
        let mirrored = |name: &str| Route {
            options: Some(RouteOptions {
                shadowing: Some(Shadowing {
                    upstream: ResourceRef {
                        name: name.into(),
                        namespace: None,
                    },
                }),
                ..<_>::default()
            }),
            ..route_to("petstore")
        };
        let hosts = vec![VirtualHost {
            name: "default.vs".into(),
            routes: vec![mirrored("mirror"), mirrored("gone")],
            ..<_>::default()
        }];
        let snapshot = Snapshot::new(enum_map! {
            ResourceType::Cluster => [
                ("petstore_default".to_string(), json!({ "name": "petstore_default" })),
                ("mirror_default".to_string(), json!({ "name": "mirror_default" })),
            ]
            .into(),
            ResourceType::Route => [(
                "http".to_string(),
                json!({ "name": "http", "virtualHosts": hosts }),
            )]
            .into(),
            _ => Default::default(),
        });

        let mut reports = ReportMap::new();
        let sanitized = RouteReplacingSanitizer::default().sanitize(
            &ApiSnapshot::default(),
            &proxy(),
            snapshot,
            &mut reports,
        );

        let hosts: Vec<VirtualHost> = serde_json::from_value(
            sanitized.resources(ResourceType::Route).get("http").unwrap()["virtualHosts"].clone(),
        )
        .unwrap();
        assert_eq!(mirrored("mirror"), hosts[0].routes[0]);
        assert_eq!(None, hosts[0].routes[1].options.as_ref().unwrap().shadowing);
        assert_eq!(
            vec!["1 route(s) in http point at missing upstreams".to_string()],
            reports.get(&proxy().source_key()).unwrap().warnings
        );
    }

    #[test]
    fn noop_leaves_snapshot() {
        let mut reports = ReportMap::new();
        assert_eq!(
            snapshot(),
            NoopSanitizer.sanitize(&ApiSnapshot::default(), &proxy(), snapshot(), &mut reports)
        );
    }
}
