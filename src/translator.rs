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

//! Translation of gateways and their routing resources into [`Proxy`]
//! configuration.

mod delegation;
mod pipeline;
mod route_tables;

use std::{collections::BTreeSet, sync::Arc};

use tokio_util::sync::CancellationToken;

use crate::{
    plugins::{ExtensionTarget, PluginRegistry, RouteContext},
    proxy::{self, Proxy, Route, VirtualHost},
    query::ResourceIndex,
    reports::ReportMap,
    resources::{Action, Gateway, KubeObject, ResourceKey, ResourceSnapshot, VirtualHostOption},
};

pub use self::{
    delegation::{DelegationResolver, VirtualHostEntry},
    pipeline::FilterPipeline,
    route_tables::{flatten_rules, FlatRule},
};

/// Translates gateways into proxies using a fixed set of plugins.
#[derive(Clone)]
pub struct Translator {
    registry: Arc<PluginRegistry>,
}

impl Translator {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Translates `gateway` and everything it selects into a proxy. Problems
    /// are recorded in `reports` against the resource that caused them;
    /// `None` means the gateway itself is invalid or the pass was cancelled.
    #[tracing::instrument(skip_all, fields(gateway = %ResourceKey::of(gateway)))]
    pub fn translate_proxy(
        &self,
        cancel: &CancellationToken,
        gateway: &Gateway,
        index: &ResourceIndex,
        resources: &ResourceSnapshot,
        reports: &mut ReportMap,
    ) -> Option<Proxy> {
        if cancel.is_cancelled() {
            return None;
        }

        let gateway_key = ResourceKey::of(gateway);
        reports.accept(gateway_key.clone());
        if let Err(error) = validate_listeners(gateway) {
            tracing::debug!(%error, "gateway rejected");
            reports.add_error(&gateway_key, error);
            return None;
        }

        let resolver = DelegationResolver::new(index);
        let mut virtual_hosts = Vec::new();
        for entry in resolver.compute_virtual_hosts(gateway, &resources.virtual_services, reports) {
            if cancel.is_cancelled() {
                return None;
            }
            virtual_hosts.push(self.translate_virtual_host(cancel, entry, index, reports));
        }

        let mut listeners = Vec::with_capacity(gateway.spec.listeners.len());
        for listener in &gateway.spec.listeners {
            let mut hosts = virtual_hosts.clone();
            if let Some(option) = resolver.listener_options(gateway, &listener.name, reports) {
                self.attach_listener_options(cancel, option, &mut hosts, reports);
            }

            reports
                .accept(gateway_key.clone())
                .listeners
                .insert(listener.name.clone(), hosts.len() as u32);
            listeners.push(proxy::Listener {
                name: listener.name.clone(),
                bind_address: listener.bind_address.clone(),
                bind_port: listener.bind_port,
                virtual_hosts: hosts,
            });
        }

        tracing::debug!(
            listeners = listeners.len(),
            virtual_hosts = virtual_hosts.len(),
            "translated gateway"
        );
        Some(Proxy {
            name: gateway.name().to_owned(),
            namespace: gateway.namespace().to_owned(),
            listeners,
        })
    }

    fn translate_virtual_host(
        &self,
        cancel: &CancellationToken,
        entry: VirtualHostEntry<'_>,
        index: &ResourceIndex,
        reports: &mut ReportMap,
    ) -> VirtualHost {
        let VirtualHostEntry {
            source,
            mut virtual_host,
        } = entry;
        let pipeline = FilterPipeline::new(&self.registry);

        for flat in flatten_rules(index, source, &source.spec.virtual_host.routes, reports) {
            let source_key = ResourceKey::of(flat.source);
            let mut route = Route {
                name: flat.rule.name.clone(),
                matchers: flat.matchers,
                action: flat
                    .rule
                    .action
                    .as_ref()
                    .and_then(|action| output_action(action, flat.source.namespace())),
                options: None,
            };

            let mut ctx = RouteContext {
                source: flat.source,
                rule: flat.rule,
                query: index,
                reporter: reports.accept(source_key.clone()),
            };
            // A failing filter leaves the route partially configured; it is
            // still served.
            let _ = pipeline.apply(cancel, &mut ctx, &mut route);

            if route.action.is_none() {
                reports.add_error(
                    &source_key,
                    format!(
                        "rule {} has no action",
                        flat.rule.name.as_deref().unwrap_or("<unnamed>")
                    ),
                );
                continue;
            }
            virtual_host.routes.push(route);
        }

        virtual_host
    }

    /// Applies a listener-attached option bundle to the hosts that have no
    /// options of their own.
    fn attach_listener_options(
        &self,
        cancel: &CancellationToken,
        option: &VirtualHostOption,
        hosts: &mut [VirtualHost],
        reports: &mut ReportMap,
    ) {
        let plugin = match self.registry.get_extension_plugin(&option.group_kind()) {
            Ok(plugin) => plugin,
            Err(error) => {
                reports.add_error(&ResourceKey::of(option), error.to_string());
                return;
            }
        };

        for host in hosts.iter_mut().filter(|host| host.options.is_none()) {
            let target = ExtensionTarget::VirtualHost(host);
            if let Err(error) = plugin.apply_ext_plugin(cancel, option, target) {
                reports.add_error(&ResourceKey::of(option), error.to_string());
                return;
            }
        }
    }
}

fn validate_listeners(gateway: &Gateway) -> Result<(), String> {
    let listeners = &gateway.spec.listeners;
    if listeners.is_empty() {
        return Err("gateway has no listeners".into());
    }

    let mut names = BTreeSet::new();
    let mut ports = BTreeSet::new();
    for listener in listeners {
        if !names.insert(&listener.name) {
            return Err(format!("duplicate listener name {}", listener.name));
        }
        if !ports.insert((&listener.bind_address, listener.bind_port)) {
            return Err(format!(
                "listener {} binds {}:{} more than once",
                listener.name, listener.bind_address, listener.bind_port
            ));
        }
    }

    Ok(())
}

/// Converts a non-delegating source action, making implicit upstream
/// namespaces explicit.
fn output_action(action: &Action, namespace: &str) -> Option<proxy::Action> {
    Some(match action {
        Action::Route(route) => proxy::Action::Route(crate::resources::RouteAction {
            upstream: route.upstream.qualified(namespace),
        }),
        Action::DirectResponse(response) => proxy::Action::DirectResponse(response.clone()),
        Action::Redirect(redirect) => proxy::Action::Redirect(redirect.clone()),
        Action::Delegate(_) => return None,
    })
}
