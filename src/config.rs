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

//! Controller settings.

mod error;

use std::{io, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};

pub use self::error::{ValidationError, ValueInvalidArgs};

pub const DEFAULT_CONTROLLER_NAME: &str = "portcullis.dev/gateway";
pub const DEFAULT_RESOURCE_PATH: &str = "/etc/portcullis/resources.yaml";

/// Settings for `portcullis manage`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
    /// Recorded in every status written, identifying this controller.
    #[serde(default = "default_controller_name")]
    pub controller_name: String,
    #[serde(default)]
    pub xds: Xds,
    #[serde(default)]
    pub admin: Admin,
    #[serde(default)]
    pub provider: Provider,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            controller_name: default_controller_name(),
            xds: Xds::default(),
            admin: Admin::default(),
            provider: Provider::default(),
        }
    }
}

fn default_controller_name() -> String {
    DEFAULT_CONTROLLER_NAME.into()
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Xds {
    /// Empties the snapshots of proxies that no longer exist.
    #[serde(default = "default_true")]
    pub garbage_collection: bool,
}

impl Default for Xds {
    fn default() -> Self {
        Self {
            garbage_collection: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Admin {
    #[serde(default = "default_admin_address")]
    pub address: SocketAddr,
}

impl Default for Admin {
    fn default() -> Self {
        Self {
            address: default_admin_address(),
        }
    }
}

fn default_admin_address() -> SocketAddr {
    (std::net::Ipv6Addr::UNSPECIFIED, crate::admin::PORT).into()
}

/// Where routing resources, discovery data and secrets come from.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Provider {
    File { path: PathBuf },
    Kubernetes,
}

impl Default for Provider {
    fn default() -> Self {
        Self::File {
            path: DEFAULT_RESOURCE_PATH.into(),
        }
    }
}

impl Settings {
    /// Attempts to deserialize `input` as YAML into [`Settings`].
    pub fn from_reader<R: io::Read>(input: R) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_reader(input)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.controller_name.trim().is_empty() {
            return Err(ValidationError::Empty("controllerName".into()));
        }

        if !self.controller_name.contains('/') {
            return Err(ValueInvalidArgs {
                field: "controllerName".into(),
                clarification: Some("must be a domain prefixed path".into()),
                examples: Some(vec![DEFAULT_CONTROLLER_NAME.into()]),
            }
            .into());
        }

        if let Provider::File { path } = &self.provider {
            if path.as_os_str().is_empty() {
                return Err(ValidationError::Empty("provider.path".into()));
            }
        }

        Ok(())
    }
}
