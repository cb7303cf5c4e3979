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

//! Sources of routing resources, discovery data and secrets, and sinks for
//! resource statuses.

pub mod fs;
pub mod k8s;

use crate::resources::{Gateway, GatewayStatus, ResourceSnapshot, RouteStatus, RouteTable, VirtualService};

/// Functionally infinite retries, providers run for the lifetime of the
/// process.
const RETRIES: u32 = u32::MAX;
const BACKOFF_STEP: std::time::Duration = std::time::Duration::from_millis(250);
const MAX_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kubernetes request failed: {0}")]
    Kube(#[from] kube::Error),
    #[error("failed to read resources: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid resource: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown resource kind `{0}`")]
    UnknownKind(String),
    #[error("{kind} {name} has no namespace")]
    MissingNamespace { kind: String, name: String },
}

/// Lists routing resources and writes their statuses back.
#[async_trait::async_trait]
pub trait ResourceClient: Send + Sync {
    /// Lists every routing resource. Failure aborts the pass that asked.
    async fn list(&self) -> Result<ResourceSnapshot, Error>;

    async fn write_gateway_status(
        &self,
        gateway: &Gateway,
        status: GatewayStatus,
    ) -> Result<(), Error>;

    async fn write_virtual_service_status(
        &self,
        virtual_service: &VirtualService,
        status: RouteStatus,
    ) -> Result<(), Error>;

    async fn write_route_table_status(
        &self,
        route_table: &RouteTable,
        status: RouteStatus,
    ) -> Result<(), Error>;
}

/// Runs `task` until it succeeds, backing off exponentially between
/// failures.
pub(crate) async fn retry<F, Fut>(name: &'static str, task: F) -> crate::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::Result<()>>,
{
    tryhard::retry_fn(task)
        .retries(RETRIES)
        .exponential_backoff(BACKOFF_STEP)
        .max_delay(MAX_DELAY)
        .on_retry(move |attempt, _, error: &eyre::Error| {
            let error = error.to_string();
            async move {
                tracing::warn!(provider = name, %attempt, %error, "provider task failed, retrying");
            }
        })
        .await
}
