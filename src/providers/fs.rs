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

use std::path::{Path, PathBuf};

use notify::Watcher;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::Instrument;

use super::{Error, ResourceClient};
use crate::{
    resources::{
        DiscoveryInputs, Endpoint, Gateway, GatewayStatus, ResourceSnapshot, RouteStatus,
        RouteTable, Secret, SecretInputs, Upstream, VirtualService,
    },
    xds::XdsInputChannels,
};

/// Namespace given to resources in the file that don't name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The contents of a resource file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFile {
    /// Routing resources in their Kubernetes manifest form.
    #[serde(default)]
    pub resources: Vec<serde_json::Value>,
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub secrets: Vec<Secret>,
}

impl ResourceFile {
    pub async fn read(path: &Path) -> Result<Self, Error> {
        let buf = tokio::fs::read(path).await?;
        Self::from_slice(&buf)
    }

    pub fn from_slice(buf: &[u8]) -> Result<Self, Error> {
        Ok(serde_yaml::from_slice(buf)?)
    }

    pub fn discovery_inputs(&self) -> DiscoveryInputs {
        DiscoveryInputs {
            upstreams: self.upstreams.clone(),
            endpoints: self.endpoints.clone(),
        }
    }

    pub fn secret_inputs(&self) -> SecretInputs {
        SecretInputs {
            secrets: self.secrets.clone(),
        }
    }

    /// Parses the routing resources by their `kind`.
    pub fn resource_snapshot(&self) -> Result<ResourceSnapshot, Error> {
        let mut snapshot = ResourceSnapshot::default();
        for value in &self.resources {
            let kind = value
                .get("kind")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();

            match kind {
                "Gateway" => snapshot.gateways.push(parse(value)?),
                "VirtualService" => snapshot.virtual_services.push(parse(value)?),
                "RouteTable" => snapshot.route_tables.push(parse(value)?),
                "VirtualHostOption" => snapshot.virtual_host_options.push(parse(value)?),
                "RouteOption" => snapshot.route_options.push(parse(value)?),
                unknown => return Err(Error::UnknownKind(unknown.to_owned())),
            }
        }
        Ok(snapshot)
    }
}

fn parse<K>(value: &serde_json::Value) -> Result<K, Error>
where
    K: kube::Resource + DeserializeOwned,
{
    let mut object: K = serde_json::from_value(value.clone())?;
    object
        .meta_mut()
        .namespace
        .get_or_insert_with(|| DEFAULT_NAMESPACE.into());
    Ok(object)
}

/// Serves routing resources from a YAML file, re-read on every listing.
/// Statuses are logged rather than stored.
#[derive(Clone, Debug)]
pub struct FileResources {
    path: PathBuf,
}

impl FileResources {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn log_status(kind: &str, object: &impl kube::Resource, status: &impl Serialize) {
    let meta = object.meta();
    tracing::info!(
        kind,
        namespace = meta.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE),
        name = meta.name.as_deref().unwrap_or_default(),
        status = %serde_json::to_string(status).unwrap_or_default(),
        "resource status"
    );
}

#[async_trait::async_trait]
impl ResourceClient for FileResources {
    async fn list(&self) -> Result<ResourceSnapshot, Error> {
        ResourceFile::read(&self.path).await?.resource_snapshot()
    }

    async fn write_gateway_status(
        &self,
        gateway: &Gateway,
        status: GatewayStatus,
    ) -> Result<(), Error> {
        log_status("Gateway", gateway, &status);
        Ok(())
    }

    async fn write_virtual_service_status(
        &self,
        virtual_service: &VirtualService,
        status: RouteStatus,
    ) -> Result<(), Error> {
        log_status("VirtualService", virtual_service, &status);
        Ok(())
    }

    async fn write_route_table_status(
        &self,
        route_table: &RouteTable,
        status: RouteStatus,
    ) -> Result<(), Error> {
        log_status("RouteTable", route_table, &status);
        Ok(())
    }
}

/// Feeds the file's discovery data and secrets into `inputs`, and kicks a
/// resync, initially and every time the file's data changes.
pub async fn watch(path: impl Into<PathBuf>, inputs: XdsInputChannels) -> crate::Result<()> {
    let path = path.into();
    let span = tracing::info_span!("fs_provider", path = %path.display());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    async fn watch_inner(
        path: &Path,
        inputs: &XdsInputChannels,
        tx: tokio::sync::mpsc::UnboundedSender<Result<notify::Event, notify::Error>>,
    ) -> crate::Result<(notify::RecommendedWatcher, ResourceFile)> {
        tracing::info!("discovering resources through filesystem");
        let mut watcher = notify::RecommendedWatcher::new(
            move |res| {
                // The receiver only goes away once watching has stopped.
                let _ = tx.send(res);
            },
            Default::default(),
        )?;

        let file = ResourceFile::read(path).await?;
        inputs.update_discovery_inputs(file.discovery_inputs());
        inputs.update_secret_inputs(file.secret_inputs());
        inputs.kick();

        watcher.watch(path, notify::RecursiveMode::NonRecursive)?;
        tracing::info!("watching file");
        Ok((watcher, file))
    }

    let (_watcher, mut current) = watch_inner(&path, &inputs, tx)
        .instrument(span.clone())
        .await?;

    while let Some(event) = rx.recv().instrument(span.clone()).await.transpose()? {
        tracing::trace!(event = ?event.kind, "new file event");

        if !matches!(
            event.kind,
            notify::EventKind::Modify(notify::event::ModifyKind::Data(_))
        ) {
            continue;
        }

        // Reading immediately after the change can observe a partial write.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let file = match ResourceFile::read(&path).await {
            Ok(file) => file,
            Err(error) => {
                tracing::warn!(%error, path = %path.display(), "failed to read resource file");
                continue;
            }
        };

        tracing::info!(path = %path.display(), "file changed, updating inputs");
        if file.upstreams != current.upstreams || file.endpoints != current.endpoints {
            inputs.update_discovery_inputs(file.discovery_inputs());
        }
        if file.secrets != current.secrets {
            inputs.update_secret_inputs(file.secret_inputs());
        }
        inputs.kick();
        current = file;
    }

    Err(eyre::eyre!("filesystem watch unexpectedly stopped"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::resources::{KubeObject, ResourceRef};

    const FILE: &str = r#"
resources:
  - apiVersion: gateway.portcullis.dev/v1
    kind: Gateway
    metadata:
      name: gw
    spec:
      listeners:
        - name: http
          bindPort: 8080
  - apiVersion: gateway.portcullis.dev/v1
    kind: VirtualService
    metadata:
      name: petstore
      namespace: team-a
    spec:
      virtualHost:
        domains: ["petstore.example.com"]
        routes:
          - matchers:
              - path:
                  prefix: /
            action:
              routeAction:
                upstream:
                  name: petstore
upstreams:
  - name: petstore
    namespace: team-a
endpoints:
  - upstream:
      name: petstore
      namespace: team-a
    address: 10.0.0.1
    port: 8080
"#;

    #[test]
    fn parses_resources_by_kind() {
        let file = ResourceFile::from_slice(FILE.as_bytes()).unwrap();
        let snapshot = file.resource_snapshot().unwrap();

        assert_eq!(1, snapshot.gateways.len());
        assert_eq!(DEFAULT_NAMESPACE, snapshot.gateways[0].namespace());
        assert_eq!(1, snapshot.virtual_services.len());
        assert_eq!("team-a", snapshot.virtual_services[0].namespace());
        assert_eq!(
            ResourceRef::new("team-a", "petstore"),
            file.discovery_inputs().endpoints[0].upstream
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let file = ResourceFile::from_slice(
            b"resources:\n  - apiVersion: v1\n    kind: ConfigMap\n    metadata:\n      name: x\n",
        )
        .unwrap();
        assert!(matches!(
            file.resource_snapshot(),
            Err(Error::UnknownKind(kind)) if kind == "ConfigMap"
        ));
    }

    #[tokio::test]
    async fn lists_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.yaml");
        tokio::fs::write(&path, FILE).await.unwrap();

        let snapshot = FileResources::new(&path).list().await.unwrap();
        assert_eq!(1, snapshot.gateways.len());
    }

    #[tokio::test]
    async fn watch_publishes_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.yaml");
        tokio::fs::write(&path, FILE).await.unwrap();

        let inputs = XdsInputChannels::new();
        let _handle = tokio::spawn(watch(path.clone(), inputs.clone()));

        let discovery = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            inputs.discovery.next_value(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(1, discovery.upstreams.len());
        assert!(tokio::time::timeout(
            std::time::Duration::from_secs(5),
            inputs.secrets.next_value()
        )
        .await
        .unwrap()
        .is_some());
    }
}
