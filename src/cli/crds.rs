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

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

use crate::resources::{Gateway, RouteOption, RouteTable, VirtualHostOption, VirtualService};

/// Prints the custom resource definitions of every routing resource as a
/// multi-document YAML stream.
#[derive(clap::Args, Clone, Debug)]
pub struct Crds {}

impl Crds {
    pub fn print(&self) -> crate::Result<()> {
        print!("{}", render()?);
        Ok(())
    }
}

fn definitions() -> Vec<CustomResourceDefinition> {
    vec![
        Gateway::crd(),
        VirtualService::crd(),
        RouteTable::crd(),
        VirtualHostOption::crd(),
        RouteOption::crd(),
    ]
}

fn render() -> crate::Result<String> {
    let mut output = String::new();
    for crd in definitions() {
        output.push_str("---\n");
        output.push_str(&serde_yaml::to_string(&crd)?);
    }
    Ok(output)
}
