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

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use portcullis::{
    plugins::{Error, ExtensionTarget, PluginRegistry},
    proxy::{Proxy, Route, VirtualHost},
    query::ResourceIndex,
    reports::ReportMap,
    resources::{
        Action, Filter, GroupKind, LocalObjectReference, ResourceKey, ResourceRef,
        ResourceSnapshot, RouteAction, RouteOption, RouteOptionSpec, RouteOptions, Rule,
        Shadowing, Upstream, VirtualHostOption, VirtualHostOptions, GROUP,
    },
    test::{
        extauth_config, gateway, namespaced, request_headers, virtual_host_option,
        virtual_service,
    },
    translator::Translator,
    xds::{
        ApiSnapshot, BasicCompiler, ConfigCompiler, ResourceType, RouteReplacingSanitizer,
        Sanitizer,
    },
};

fn translate(resources: &ResourceSnapshot, reports: &mut ReportMap) -> Proxy {
    translate_gateway(resources, 0, reports)
}

fn translate_gateway(
    resources: &ResourceSnapshot,
    gateway: usize,
    reports: &mut ReportMap,
) -> Proxy {
    let index = ResourceIndex::new(resources);
    Translator::new(Arc::new(PluginRegistry::default()))
        .translate_proxy(
            &CancellationToken::new(),
            &resources.gateways[gateway],
            &index,
            resources,
            reports,
        )
        .unwrap()
}

fn hosts(proxy: &Proxy) -> &[VirtualHost] {
    &proxy.listeners[0].virtual_hosts
}

fn reference(name: &str) -> ResourceRef {
    ResourceRef::new("default", name)
}

fn headers_option(name: &str, header: &str) -> VirtualHostOption {
    virtual_host_option(
        "default",
        name,
        VirtualHostOptions {
            header_manipulation: Some(request_headers(&[(header, "1")])),
            ..<_>::default()
        },
    )
}

#[test]
fn delegated_options_per_virtual_service() {
    let resources = ResourceSnapshot {
        gateways: vec![gateway("default", "gw", &[("http", 8080)])],
        virtual_services: vec![
            virtual_service(
                "default",
                "east",
                "east.com",
                &[reference("o1"), reference("o2")],
                vec![],
            ),
            virtual_service(
                "default",
                "west",
                "west.com",
                &[reference("o3"), reference("o4")],
                vec![],
            ),
            virtual_service("default", "south", "south.com", &[], vec![]),
        ],
        virtual_host_options: vec![
            headers_option("o1", "x-east-first"),
            headers_option("o2", "x-east-second"),
            headers_option("o3", "x-west"),
            virtual_host_option(
                "default",
                "o4",
                VirtualHostOptions {
                    extauth: Some(extauth_config("default", "auth")),
                    ..<_>::default()
                },
            ),
        ],
        ..<_>::default()
    };
    let mut reports = ReportMap::new();

    let proxy = translate(&resources, &mut reports);
    let hosts = hosts(&proxy);

    assert_eq!(
        vec!["east.com", "west.com", "south.com"],
        hosts
            .iter()
            .map(|host| host.domains[0].as_str())
            .collect::<Vec<_>>()
    );

    let east = hosts[0].options.as_ref().unwrap();
    assert_eq!(
        Some(request_headers(&[("x-east-first", "1")])),
        east.header_manipulation
    );
    assert_eq!(None, east.extauth);

    let west = hosts[1].options.as_ref().unwrap();
    assert_eq!(
        Some(request_headers(&[("x-west", "1")])),
        west.header_manipulation
    );
    assert_eq!(Some(extauth_config("default", "auth")), west.extauth);

    assert_eq!(None, hosts[2].options);

    for (key, report) in reports.iter() {
        assert!(report.errors.is_empty(), "{key}: {:?}", report.errors);
    }
}

#[test]
fn earlier_bundle_wins_regardless_of_cardinality() {
    let resources = ResourceSnapshot {
        gateways: vec![gateway("default", "gw", &[("http", 8080)])],
        virtual_services: vec![virtual_service(
            "default",
            "vs",
            "example.com",
            &[reference("single"), reference("many")],
            vec![],
        )],
        virtual_host_options: vec![
            headers_option("single", "x-only"),
            virtual_host_option(
                "default",
                "many",
                VirtualHostOptions {
                    header_manipulation: Some(request_headers(&[
                        ("x-a", "1"),
                        ("x-b", "2"),
                        ("x-c", "3"),
                    ])),
                    ..<_>::default()
                },
            ),
        ],
        ..<_>::default()
    };

    let proxy = translate(&resources, &mut ReportMap::new());

    assert_eq!(
        Some(request_headers(&[("x-only", "1")])),
        hosts(&proxy)[0]
            .options
            .as_ref()
            .unwrap()
            .header_manipulation
    );
}

#[test]
fn missing_delegate_is_isolated() {
    let resources = ResourceSnapshot {
        gateways: vec![gateway("default", "gw", &[("http", 8080)])],
        virtual_services: vec![
            virtual_service("default", "broken", "broken.com", &[reference("gone")], vec![]),
            virtual_service("default", "healthy", "healthy.com", &[reference("o1")], vec![]),
        ],
        virtual_host_options: vec![headers_option("o1", "x-healthy")],
        ..<_>::default()
    };
    let mut reports = ReportMap::new();

    let proxy = translate(&resources, &mut reports);

    assert_eq!(2, hosts(&proxy).len());
    assert_eq!(None, hosts(&proxy)[0].options);
    assert_eq!(
        Some(request_headers(&[("x-healthy", "1")])),
        hosts(&proxy)[1]
            .options
            .as_ref()
            .unwrap()
            .header_manipulation
    );
    assert_eq!(
        1,
        reports
            .get(&ResourceKey::new("VirtualService", "default", "broken"))
            .unwrap()
            .errors
            .len()
    );
    assert!(reports
        .get(&ResourceKey::new("VirtualService", "default", "healthy"))
        .unwrap()
        .errors
        .is_empty());
}

#[test]
fn shared_virtual_service_errors_are_reported_once() {
    let resources = ResourceSnapshot {
        gateways: vec![
            gateway("default", "gw-a", &[("http", 8080)]),
            gateway("default", "gw-b", &[("http", 8081)]),
        ],
        virtual_services: vec![virtual_service(
            "default",
            "broken",
            "broken.com",
            &[reference("gone")],
            vec![],
        )],
        ..<_>::default()
    };
    let mut reports = ReportMap::new();

    for index in 0..resources.gateways.len() {
        let mut gateway_reports = ReportMap::new();
        translate_gateway(&resources, index, &mut gateway_reports);
        reports.merge(gateway_reports);
    }
    translate_gateway(&resources, 0, &mut reports);

    assert_eq!(
        1,
        reports
            .get(&ResourceKey::new("VirtualService", "default", "broken"))
            .unwrap()
            .errors
            .len()
    );
}

#[test]
fn route_option_mirrors_survive_sanitizing() {
    let upstream = |name: &str| Upstream {
        name: name.into(),
        namespace: "default".into(),
        hosts: Vec::new(),
    };
    let mirror = RouteOptions {
        shadowing: Some(Shadowing {
            upstream: ResourceRef {
                name: "mirror".into(),
                namespace: None,
            },
        }),
        ..<_>::default()
    };
    let resources = ResourceSnapshot {
        gateways: vec![gateway("default", "gw", &[("http", 8080)])],
        virtual_services: vec![virtual_service(
            "default",
            "vs",
            "example.com",
            &[],
            vec![Rule {
                action: Some(Action::Route(RouteAction {
                    upstream: reference("petstore"),
                })),
                filters: vec![Filter::extension_ref(LocalObjectReference {
                    group: GROUP.into(),
                    kind: "RouteOption".into(),
                    name: "policy".into(),
                })],
                ..<_>::default()
            }],
        )],
        route_options: vec![namespaced(
            RouteOption::new(
                "policy",
                RouteOptionSpec {
                    options: Some(mirror),
                },
            ),
            "default",
        )],
        ..<_>::default()
    };
    let mut reports = ReportMap::new();

    let proxy = translate(&resources, &mut reports);
    let input = ApiSnapshot {
        proxies: vec![proxy.clone()],
        upstreams: vec![upstream("petstore"), upstream("mirror")],
        ..<_>::default()
    };
    let snapshot = BasicCompiler.compile(&input, &proxy, &mut reports);
    let snapshot =
        RouteReplacingSanitizer::default().sanitize(&input, &proxy, snapshot, &mut reports);

    let routes = snapshot.resources(ResourceType::Route).get("http").unwrap();
    let hosts: Vec<VirtualHost> = serde_json::from_value(routes["virtualHosts"].clone()).unwrap();
    assert_eq!(
        Some(Shadowing {
            upstream: reference("mirror"),
        }),
        hosts[0].routes[0].options.as_ref().unwrap().shadowing
    );
    assert!(snapshot
        .resources(ResourceType::Cluster)
        .get("mirror_default")
        .is_some());
    let gateway = reports.get(&proxy.source_key()).unwrap();
    assert!(gateway.errors.is_empty(), "{:?}", gateway.errors);
    assert!(gateway.warnings.is_empty(), "{:?}", gateway.warnings);
}

#[test]
fn route_option_plugin_is_idempotent() {
    let payload = RouteOptions {
        timeout: Some("5s".into()),
        ..<_>::default()
    };
    let option = RouteOption::new(
        "policy",
        RouteOptionSpec {
            options: Some(payload.clone()),
        },
    );
    let registry = PluginRegistry::default();
    let plugin = registry
        .get_extension_plugin(&GroupKind::of::<RouteOption>())
        .unwrap();

    let mut route = Route {
        options: Some(RouteOptions {
            prefix_rewrite: Some("/v2".into()),
            ..<_>::default()
        }),
        ..<_>::default()
    };
    let cancel = CancellationToken::new();
    plugin
        .apply_ext_plugin(&cancel, &option, ExtensionTarget::Route(&mut route))
        .unwrap();
    let once = route.clone();
    plugin
        .apply_ext_plugin(&cancel, &option, ExtensionTarget::Route(&mut route))
        .unwrap();

    assert_eq!(once, route);
    assert_eq!(Some(payload), route.options);
}

#[test]
fn registry_lookups_are_typed() {
    let registry = PluginRegistry::default();

    assert_eq!(
        Err(Error::FilterNotFound("NotAFilter".into())),
        registry.get_standard_plugin("NotAFilter").map(|_| ())
    );
    let unknown = GroupKind::new("example.com", "Widget");
    assert_eq!(
        Err(Error::ExtensionNotFound(unknown.clone())),
        registry.get_extension_plugin(&unknown).map(|_| ())
    );

    let route_options = GroupKind::of::<RouteOption>();
    for _ in 0..2 {
        assert_eq!(
            route_options,
            registry
                .get_extension_plugin(&route_options)
                .unwrap()
                .group_kind()
        );
    }
    assert_eq!(
        "RequestHeaderModifier",
        registry
            .get_standard_plugin("RequestHeaderModifier")
            .unwrap()
            .filter_type()
    );
}
