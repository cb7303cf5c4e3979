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

use once_cell::sync::Lazy;
use prometheus::{Encoder, Registry, TextEncoder};

pub(crate) const KIND_LABEL: &str = "kind";
pub(crate) const RESULT_LABEL: &str = "result";

static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("portcullis".into()), None)
        .expect("the metrics prefix is a valid metric name")
});

/// The registry every control plane metric is registered with.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Renders every registered metric in the Prometheus text format.
pub fn encode() -> crate::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry().gather(), &mut buffer)?;
    Ok(buffer)
}

pub(crate) fn text_content_type() -> String {
    TextEncoder::new().format_type().to_owned()
}
