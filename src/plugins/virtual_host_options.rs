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
    resources::{GroupKind, KubeObject, VirtualHostOption},
};

/// Applies [`VirtualHostOption`] objects to virtual hosts. A non-empty payload
/// replaces the host's options wholesale.
#[derive(Debug)]
pub struct VirtualHostOptionPlugin;

impl ExtensionPlugin for VirtualHostOptionPlugin {
    fn group_kind(&self) -> GroupKind {
        GroupKind::of::<VirtualHostOption>()
    }

    fn apply_ext_plugin(
        &self,
        cancel: &CancellationToken,
        object: &dyn KubeObject,
        output: ExtensionTarget<'_>,
    ) -> Result<(), Error> {
        let option = downcast_object::<VirtualHostOption>(object)?;
        let target = output.kind();
        let ExtensionTarget::VirtualHost(host) = output else {
            return Err(Error::UnsupportedTarget {
                kind: self.group_kind(),
                target,
            });
        };

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(options) = &option.spec.options {
            host.options = Some(options.clone());
        }
        Ok(())
    }
}
