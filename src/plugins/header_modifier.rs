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
    resources::{filter_type, Filter, HeaderFilter, HeaderValue, HeaderValueOption, HttpHeader},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Request,
    Response,
}

/// Adds, replaces and removes request or response headers on a route.
#[derive(Debug)]
pub struct HeaderModifier {
    direction: Direction,
}

impl HeaderModifier {
    pub fn request() -> Self {
        Self {
            direction: Direction::Request,
        }
    }

    pub fn response() -> Self {
        Self {
            direction: Direction::Response,
        }
    }

    fn payload<'f>(&self, filter: &'f Filter) -> Result<&'f HeaderFilter, Error> {
        let (payload, field) = match self.direction {
            Direction::Request => (&filter.request_header_modifier, "requestHeaderModifier"),
            Direction::Response => (&filter.response_header_modifier, "responseHeaderModifier"),
        };

        payload.as_ref().ok_or(Error::MissingConfig {
            filter_type: self.filter_type(),
            field,
        })
    }
}

fn header_value(header: &HttpHeader, append: bool) -> HeaderValueOption {
    HeaderValueOption {
        header: HeaderValue {
            key: header.name.clone(),
            value: header.value.clone(),
        },
        append: Some(append),
    }
}

impl FilterPlugin for HeaderModifier {
    fn filter_type(&self) -> &'static str {
        match self.direction {
            Direction::Request => filter_type::REQUEST_HEADER_MODIFIER,
            Direction::Response => filter_type::RESPONSE_HEADER_MODIFIER,
        }
    }

    fn apply_filter(
        &self,
        _: &CancellationToken,
        _: &RouteContext<'_>,
        filter: &Filter,
        output: &mut Route,
    ) -> Result<(), Error> {
        check_filter_type(self, filter)?;
        let payload = self.payload(filter)?;

        let headers = output
            .options_mut()
            .header_manipulation
            .get_or_insert_with(Default::default);
        let (to_add, to_remove) = match self.direction {
            Direction::Request => (
                &mut headers.request_headers_to_add,
                &mut headers.request_headers_to_remove,
            ),
            Direction::Response => (
                &mut headers.response_headers_to_add,
                &mut headers.response_headers_to_remove,
            ),
        };

        to_add.extend(payload.set.iter().map(|h| header_value(h, false)));
        to_add.extend(payload.add.iter().map(|h| header_value(h, true)));
        to_remove.extend(payload.remove.iter().cloned());
        Ok(())
    }
}
