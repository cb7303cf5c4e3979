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
    plugins::{Error, PluginRegistry, RouteContext},
    proxy::Route,
    resources::Condition,
};

/// Applies the filters of a rule to its output route, in declaration order.
pub struct FilterPipeline<'r> {
    registry: &'r PluginRegistry,
}

impl<'r> FilterPipeline<'r> {
    pub fn new(registry: &'r PluginRegistry) -> Self {
        Self { registry }
    }

    /// Runs every filter of `ctx.rule` against `output`. The first failure
    /// stops the rule's remaining filters and marks the source resource
    /// partially invalid; other rules are unaffected.
    pub fn apply(
        &self,
        cancel: &CancellationToken,
        ctx: &mut RouteContext<'_>,
        output: &mut Route,
    ) -> Result<(), Error> {
        let rule = ctx.rule;
        for filter in &rule.filters {
            let result = self
                .registry
                .get_standard_plugin(&filter.r#type)
                .and_then(|plugin| plugin.apply_filter(cancel, ctx, filter, output));

            if let Err(error) = result {
                tracing::debug!(
                    filter_type = %filter.r#type,
                    source = ctx.source.name(),
                    %error,
                    "failed to apply filter"
                );
                ctx.reporter
                    .set_condition(Condition::incompatible_filters(error.to_string()));
                return Err(error);
            }
        }

        Ok(())
    }
}
