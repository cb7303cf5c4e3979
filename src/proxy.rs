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

//! The translated, proxy-agnostic configuration produced for each gateway.

use serde::{Deserialize, Serialize};

use crate::resources::{
    DirectResponseAction, Matcher, RedirectAction, ResourceKey, RouteAction, RouteOptions,
    VirtualHostOptions,
};

/// The intermediate configuration for one gateway, before compilation into
/// proxy resources.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proxy {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub listeners: Vec<Listener>,
}

impl Proxy {
    /// The gateway this proxy was translated from. Reports about the proxy
    /// are filed under this key.
    pub fn source_key(&self) -> ResourceKey {
        ResourceKey::new("Gateway", &self.namespace, &self.name)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.listeners
            .iter()
            .flat_map(|listener| &listener.virtual_hosts)
            .flat_map(|host| &host.routes)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    pub bind_address: String,
    pub bind_port: u16,
    #[serde(default)]
    pub virtual_hosts: Vec<VirtualHost>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualHost {
    pub name: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<VirtualHostOptions>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RouteOptions>,
}

impl Route {
    /// The route's options, created empty on first access.
    pub fn options_mut(&mut self) -> &mut RouteOptions {
        self.options.get_or_insert_with(RouteOptions::default)
    }
}

/// What a route does with the traffic it matches. Delegation never survives
/// translation, so unlike the source rules there is no delegate action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Route(RouteAction),
    DirectResponse(DirectResponseAction),
    Redirect(RedirectAction),
}
