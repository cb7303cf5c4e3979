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

use crate::{query::QueryError, resources::GroupKind};

/// An error returned while looking up or applying a plugin.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("no plugin registered for filter type `{}`", .0)]
    FilterNotFound(String),
    #[error("no extension plugin registered for {}", .0)]
    ExtensionNotFound(GroupKind),
    #[error("filter type `{}` is not supported by this plugin", .0)]
    UnsupportedFilterType(String),
    #[error("filter `{}` requires `{}` configuration, but none provided", filter_type, field)]
    MissingConfig {
        filter_type: &'static str,
        field: &'static str,
    },
    #[error("filter `{}` does not reference an object", .0)]
    MissingReference(&'static str),
    #[error("expected <{}> object, received <{}>", expected, actual)]
    MismatchedTypes {
        expected: GroupKind,
        actual: GroupKind,
    },
    #[error("{} cannot be applied to a {}", kind, target)]
    UnsupportedTarget {
        kind: GroupKind,
        target: &'static str,
    },
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("translation cancelled")]
    Cancelled,
}
