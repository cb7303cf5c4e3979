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
    proxy::{Action, Route},
    resources::{filter_type, Filter, RedirectAction},
};

/// Replaces the route's action with a redirect.
#[derive(Debug)]
pub struct RequestRedirect;

impl FilterPlugin for RequestRedirect {
    fn filter_type(&self) -> &'static str {
        filter_type::REQUEST_REDIRECT
    }

    fn apply_filter(
        &self,
        _: &CancellationToken,
        _: &RouteContext<'_>,
        filter: &Filter,
        output: &mut Route,
    ) -> Result<(), Error> {
        check_filter_type(self, filter)?;
        let redirect = filter
            .request_redirect
            .as_ref()
            .ok_or(Error::MissingConfig {
                filter_type: filter_type::REQUEST_REDIRECT,
                field: "requestRedirect",
            })?;

        output.action = Some(Action::Redirect(RedirectAction {
            host_redirect: redirect.hostname.clone(),
            path_redirect: redirect.path.clone(),
            response_code: redirect.status_code,
            https_redirect: redirect.scheme.as_deref() == Some("https"),
        }));
        Ok(())
    }
}
