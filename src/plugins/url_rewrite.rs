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
    resources::{filter_type, Filter},
};

/// Rewrites the host and path prefix of forwarded requests.
#[derive(Debug)]
pub struct UrlRewrite;

impl FilterPlugin for UrlRewrite {
    fn filter_type(&self) -> &'static str {
        filter_type::URL_REWRITE
    }

    fn apply_filter(
        &self,
        _: &CancellationToken,
        _: &RouteContext<'_>,
        filter: &Filter,
        output: &mut Route,
    ) -> Result<(), Error> {
        check_filter_type(self, filter)?;
        let rewrite = filter.url_rewrite.as_ref().ok_or(Error::MissingConfig {
            filter_type: filter_type::URL_REWRITE,
            field: "urlRewrite",
        })?;

        let options = output.options_mut();
        if let Some(hostname) = &rewrite.hostname {
            options.host_rewrite = Some(hostname.clone());
        }
        if let Some(prefix) = &rewrite.path_prefix {
            options.prefix_rewrite = Some(prefix.clone());
        }
        Ok(())
    }
}
