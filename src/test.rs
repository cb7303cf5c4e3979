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

//! Common utilities for testing

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Once,
    },
};

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use crate::{
    providers::{Error, ResourceClient},
    resources::{
        DelegateOptionsRefs, ExtAuthExtension, Gateway, GatewaySpec, GatewayStatus,
        HeaderManipulation, HeaderValue, HeaderValueOption, KubeObject, Listener, ResourceKey,
        ResourceRef, ResourceSnapshot, RouteStatus, RouteTable, Rule, VirtualHostOption,
        VirtualHostOptionSpec, VirtualHostOptions, VirtualHostSpec, VirtualService,
        VirtualServiceSpec,
    },
};

static LOG_ONCE: Once = Once::new();

/// Call to safely enable logging calls with a given tracing env filter, e.g. "portcullis=debug"
/// This can be very useful when attempting to debug unit and integration tests.
pub fn enable_log(filter: impl Into<EnvFilter>) {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .init()
    });
}

/// Places `object` in `namespace`.
pub fn namespaced<K: kube::Resource>(mut object: K, namespace: &str) -> K {
    object.meta_mut().namespace = Some(namespace.into());
    object
}

/// A gateway with one listener per `(name, port)` pair, selecting every
/// virtual service in every namespace.
pub fn gateway(namespace: &str, name: &str, listeners: &[(&str, u16)]) -> Gateway {
    namespaced(
        Gateway::new(
            name,
            GatewaySpec {
                listeners: listeners
                    .iter()
                    .map(|(name, port)| Listener {
                        name: (*name).into(),
                        bind_address: "::".into(),
                        bind_port: *port,
                    })
                    .collect(),
                virtual_service_namespaces: vec!["*".into()],
                ..<_>::default()
            },
        ),
        namespace,
    )
}

/// A virtual service serving `domain`, delegating to the virtual host options
/// named in `delegates` in order.
pub fn virtual_service(
    namespace: &str,
    name: &str,
    domain: &str,
    delegates: &[ResourceRef],
    routes: Vec<Rule>,
) -> VirtualService {
    namespaced(
        VirtualService::new(
            name,
            VirtualServiceSpec {
                virtual_host: VirtualHostSpec {
                    domains: vec![domain.into()],
                    routes,
                },
                options_config_refs: (!delegates.is_empty()).then(|| DelegateOptionsRefs {
                    delegate_options: delegates.to_vec(),
                }),
            },
        ),
        namespace,
    )
}

pub fn virtual_host_option(
    namespace: &str,
    name: &str,
    options: VirtualHostOptions,
) -> VirtualHostOption {
    namespaced(
        VirtualHostOption::new(
            name,
            VirtualHostOptionSpec {
                options: Some(options),
                target_ref: None,
            },
        ),
        namespace,
    )
}

/// Header manipulation adding each `(key, value)` request header.
pub fn request_headers(headers: &[(&str, &str)]) -> HeaderManipulation {
    HeaderManipulation {
        request_headers_to_add: headers
            .iter()
            .map(|(key, value)| HeaderValueOption {
                header: HeaderValue {
                    key: (*key).into(),
                    value: (*value).into(),
                },
                append: None,
            })
            .collect(),
        ..<_>::default()
    }
}

pub fn extauth_config(namespace: &str, name: &str) -> ExtAuthExtension {
    ExtAuthExtension::ConfigRef(ResourceRef::new(namespace, name))
}

/// An in-memory [`ResourceClient`] recording every status written.
#[derive(Default)]
pub struct FakeResourceClient {
    resources: Mutex<ResourceSnapshot>,
    fail_list: AtomicBool,
    list_calls: AtomicUsize,
    failing_writes: Mutex<BTreeSet<ResourceKey>>,
    gateway_statuses: Mutex<Vec<(ResourceKey, GatewayStatus)>>,
    route_statuses: Mutex<Vec<(ResourceKey, RouteStatus)>>,
}

impl FakeResourceClient {
    pub fn new(resources: ResourceSnapshot) -> Self {
        Self {
            resources: Mutex::new(resources),
            ..<_>::default()
        }
    }

    pub fn set_resources(&self, resources: ResourceSnapshot) {
        *self.resources.lock() = resources;
    }

    /// Makes every following listing fail, or succeed again.
    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Makes status writes to `key` fail.
    pub fn fail_writes_to(&self, key: ResourceKey) {
        self.failing_writes.lock().insert(key);
    }

    pub fn gateway_statuses(&self) -> Vec<(ResourceKey, GatewayStatus)> {
        self.gateway_statuses.lock().clone()
    }

    pub fn route_statuses(&self) -> Vec<(ResourceKey, RouteStatus)> {
        self.route_statuses.lock().clone()
    }

    fn check_write(&self, object: &dyn KubeObject) -> Result<ResourceKey, Error> {
        let key = ResourceKey::of(object);
        if self.failing_writes.lock().contains(&key) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("writes to {key} are rejected"),
            )));
        }
        Ok(key)
    }
}

#[async_trait::async_trait]
impl ResourceClient for FakeResourceClient {
    async fn list(&self) -> Result<ResourceSnapshot, Error> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "listing is unavailable",
            )));
        }
        Ok(self.resources.lock().clone())
    }

    async fn write_gateway_status(
        &self,
        gateway: &Gateway,
        status: GatewayStatus,
    ) -> Result<(), Error> {
        let key = self.check_write(gateway)?;
        self.gateway_statuses.lock().push((key, status));
        Ok(())
    }

    async fn write_virtual_service_status(
        &self,
        virtual_service: &VirtualService,
        status: RouteStatus,
    ) -> Result<(), Error> {
        let key = self.check_write(virtual_service)?;
        self.route_statuses.lock().push((key, status));
        Ok(())
    }

    async fn write_route_table_status(
        &self,
        route_table: &RouteTable,
        status: RouteStatus,
    ) -> Result<(), Error> {
        let key = self.check_write(route_table)?;
        self.route_statuses.lock().push((key, status));
        Ok(())
    }
}
