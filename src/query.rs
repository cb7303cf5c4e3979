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

//! Object lookups available to translation and plugins.

use std::{collections::BTreeMap, sync::Arc};

use crate::resources::{
    GroupKind, KubeObject, LocalObjectReference, ResourceRef, ResourceSnapshot, RouteTable,
    VirtualHostOption,
};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("{group_kind} {namespace}.{name} not found")]
    NotFound {
        group_kind: GroupKind,
        namespace: String,
        name: String,
    },
    #[error("{0} has no namespace to resolve local references in")]
    MissingNamespace(GroupKind),
}

/// Resolves object references on behalf of a referring object.
pub trait ObjectQuery: Send + Sync {
    /// Resolves `reference` in the namespace of `from`. References never
    /// cross namespaces.
    fn get_local_object(
        &self,
        from: &dyn KubeObject,
        reference: &LocalObjectReference,
    ) -> Result<Arc<dyn KubeObject>, QueryError>;
}

type IndexKey = (GroupKind, String, String);

/// An in-memory index over one listing of resources, rebuilt every pass.
#[derive(Debug, Default)]
pub struct ResourceIndex {
    objects: BTreeMap<IndexKey, Arc<dyn KubeObject>>,
}

impl ResourceIndex {
    pub fn new(snapshot: &ResourceSnapshot) -> Self {
        let mut index = Self::default();
        snapshot
            .gateways
            .iter()
            .for_each(|o| index.insert(o.clone()));
        snapshot
            .virtual_services
            .iter()
            .for_each(|o| index.insert(o.clone()));
        snapshot
            .route_tables
            .iter()
            .for_each(|o| index.insert(o.clone()));
        snapshot
            .virtual_host_options
            .iter()
            .for_each(|o| index.insert(o.clone()));
        snapshot
            .route_options
            .iter()
            .for_each(|o| index.insert(o.clone()));
        index
    }

    pub fn insert<K: KubeObject>(&mut self, object: K) {
        let key = (
            object.group_kind(),
            object.namespace().to_owned(),
            object.name().to_owned(),
        );
        self.objects.insert(key, Arc::new(object));
    }

    fn get_dyn(
        &self,
        group_kind: GroupKind,
        namespace: &str,
        name: &str,
    ) -> Option<&Arc<dyn KubeObject>> {
        self.objects
            .get(&(group_kind, namespace.to_owned(), name.to_owned()))
    }

    /// Looks up an object of the statically known kind `K`.
    pub fn get<K>(&self, namespace: &str, name: &str) -> Option<&K>
    where
        K: KubeObject + kube::Resource<DynamicType = ()>,
    {
        self.get_dyn(GroupKind::of::<K>(), namespace, name)
            .and_then(|object| object.as_any().downcast_ref::<K>())
    }

    pub fn route_table(
        &self,
        reference: &ResourceRef,
        default_namespace: &str,
    ) -> Option<&RouteTable> {
        self.get(reference.namespace_or(default_namespace), &reference.name)
    }

    pub fn virtual_host_option(
        &self,
        reference: &ResourceRef,
        default_namespace: &str,
    ) -> Option<&VirtualHostOption> {
        self.get(reference.namespace_or(default_namespace), &reference.name)
    }

    /// Every object of kind `K` in `namespace`.
    pub fn list<'a, K>(&'a self, namespace: &str) -> impl Iterator<Item = &'a K> + 'a
    where
        K: KubeObject + kube::Resource<DynamicType = ()>,
    {
        let group_kind = GroupKind::of::<K>();
        let namespace = namespace.to_owned();
        self.objects
            .iter()
            .filter(move |((gk, ns, _), _)| *gk == group_kind && *ns == namespace)
            .filter_map(|(_, object)| object.as_any().downcast_ref::<K>())
    }
}

impl ObjectQuery for ResourceIndex {
    fn get_local_object(
        &self,
        from: &dyn KubeObject,
        reference: &LocalObjectReference,
    ) -> Result<Arc<dyn KubeObject>, QueryError> {
        let namespace = from
            .metadata()
            .namespace
            .as_deref()
            .ok_or_else(|| QueryError::MissingNamespace(from.group_kind()))?;

        self.get_dyn(reference.group_kind(), namespace, &reference.name)
            .cloned()
            .ok_or_else(|| QueryError::NotFound {
                group_kind: reference.group_kind(),
                namespace: namespace.to_owned(),
                name: reference.name.clone(),
            })
    }
}
