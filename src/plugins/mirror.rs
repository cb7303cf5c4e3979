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
    plugins::{check_filter_type, Error, FilterPlugin, RouteContext},
    proxy::Route,
    resources::{filter_type, Filter, Shadowing},
};

/// Mirrors requests to a second upstream. An upstream without a namespace is
/// resolved in the namespace of the rule's source.
#[derive(Debug)]
pub struct RequestMirror;

impl FilterPlugin for RequestMirror {
    fn filter_type(&self) -> &'static str {
        filter_type::REQUEST_MIRROR
    }

    fn apply_filter(
        &self,
        _: &CancellationToken,
        ctx: &RouteContext<'_>,
        filter: &Filter,
        output: &mut Route,
    ) -> Result<(), Error> {
        check_filter_type(self, filter)?;
        let mirror = filter.request_mirror.as_ref().ok_or(Error::MissingConfig {
            filter_type: filter_type::REQUEST_MIRROR,
            field: "requestMirror",
        })?;

        output.options_mut().shadowing = Some(Shadowing {
            upstream: mirror.upstream.qualified(ctx.source.namespace()),
        });
        Ok(())
    }
}
