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

//! Resolution of the option bundles virtual hosts delegate to.

use crate::{
    proxy::VirtualHost,
    query::ResourceIndex,
    reports::{ReportMap, ResourceReport},
    resources::{
        Gateway, KubeObject, ResourceKey, VirtualHostOption, VirtualHostOptions, VirtualService,
    },
};

/// A virtual host skeleton together with the virtual service it came from.
#[derive(Debug)]
pub struct VirtualHostEntry<'a> {
    pub source: &'a VirtualService,
    pub virtual_host: VirtualHost,
}

/// Computes the virtual hosts of a gateway, resolving each virtual service's
/// delegated option bundles through the index.
pub struct DelegationResolver<'a> {
    index: &'a ResourceIndex,
}

impl<'a> DelegationResolver<'a> {
    pub fn new(index: &'a ResourceIndex) -> Self {
        Self { index }
    }

    /// Builds one virtual host per virtual service selected by `gateway`,
    /// in input order. Routes are left empty.
    ///
    /// Unresolvable option references are reported against the referring
    /// virtual service only and never affect its siblings.
    pub fn compute_virtual_hosts(
        &self,
        gateway: &Gateway,
        virtual_services: &'a [VirtualService],
        reports: &mut ReportMap,
    ) -> Vec<VirtualHostEntry<'a>> {
        virtual_services
            .iter()
            .filter(|vs| gateway.selects(vs))
            .map(|vs| {
                let report = reports.accept(ResourceKey::of(vs));
                VirtualHostEntry {
                    source: vs,
                    virtual_host: VirtualHost {
                        name: virtual_host_name(vs),
                        domains: vs.spec.virtual_host.domains.clone(),
                        routes: Vec::new(),
                        options: self.resolve_delegated_options(vs, report),
                    },
                }
            })
            .collect()
    }

    /// Merges the bundles referenced by `vs` in reference order. A field set
    /// by an earlier bundle is never overridden by a later one. Returns
    /// `None` when no reference resolves.
    fn resolve_delegated_options(
        &self,
        vs: &VirtualService,
        report: &mut ResourceReport,
    ) -> Option<VirtualHostOptions> {
        let references = vs
            .spec
            .options_config_refs
            .as_ref()
            .map(|refs| &*refs.delegate_options)
            .unwrap_or_default();
        let namespace = vs.namespace();

        let mut merged: Option<VirtualHostOptions> = None;
        for reference in references {
            match self.index.virtual_host_option(reference, namespace) {
                Some(option) => {
                    let merged = merged.get_or_insert_with(VirtualHostOptions::default);
                    if let Some(options) = &option.spec.options {
                        merged.merge_unset_from(options);
                    }
                }
                None => {
                    let reference = reference.qualified(namespace);
                    tracing::debug!(
                        virtual_service = vs.name(),
                        %reference,
                        "delegated virtual host option not found"
                    );
                    report.add_error(format!("virtual host option {reference} not found"));
                }
            }
        }

        merged
    }

    /// Selects the option bundle attached to `listener` of `gateway` through
    /// a target reference. When several bundles target the same listener the
    /// oldest wins, and every other one is warned as conflicted.
    pub fn listener_options(
        &self,
        gateway: &Gateway,
        listener: &str,
        reports: &mut ReportMap,
    ) -> Option<&'a VirtualHostOption> {
        let gateway_name = gateway.name();
        let mut candidates: Vec<&VirtualHostOption> = self
            .index
            .list::<VirtualHostOption>(gateway.namespace())
            .filter(|option| {
                option.spec.target_ref.as_ref().map_or(false, |target| {
                    target.name == gateway_name
                        && target
                            .section_name
                            .as_deref()
                            .map_or(true, |section| section == listener)
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            let created = |option: &VirtualHostOption| {
                option.metadata.creation_timestamp.as_ref().map(|time| time.0)
            };
            (created(a), a.name()).cmp(&(created(b), b.name()))
        });

        let mut candidates = candidates.into_iter();
        let winner = candidates.next()?;
        for conflicted in candidates {
            let warning = format!(
                "conflicts with virtual host option {} on listener {listener} of gateway {gateway_name}",
                winner.name()
            );
            reports.add_warning(&ResourceKey::of(conflicted), warning);
        }

        Some(winner)
    }
}

fn virtual_host_name(vs: &VirtualService) -> String {
    format!("{}.{}", vs.namespace(), vs.name())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        resources::{
            DelegateOptionsRefs, GatewaySpec, HeaderManipulation, HeaderValue, HeaderValueOption,
            PolicyTargetReference, ResourceRef, ResourceSnapshot, VirtualHostOptionSpec,
            VirtualServiceSpec,
        },
        test::namespaced,
    };

    fn header_option(name: &str, header: &str) -> VirtualHostOption {
        namespaced(
            VirtualHostOption::new(
                name,
                VirtualHostOptionSpec {
                    options: Some(VirtualHostOptions {
                        header_manipulation: Some(headers(header)),
                        ..<_>::default()
                    }),
                    target_ref: None,
                },
            ),
            "default",
        )
    }

    fn headers(header: &str) -> HeaderManipulation {
        HeaderManipulation {
            request_headers_to_add: vec![HeaderValueOption {
                header: HeaderValue {
                    key: header.into(),
                    value: "1".into(),
                },
                append: None,
            }],
            ..<_>::default()
        }
    }

    fn virtual_service(name: &str, refs: &[&str]) -> VirtualService {
        namespaced(
            VirtualService::new(
                name,
                VirtualServiceSpec {
                    options_config_refs: (!refs.is_empty()).then(|| DelegateOptionsRefs {
                        delegate_options: refs
                            .iter()
                            .map(|name| ResourceRef {
                                name: name.to_string(),
                                namespace: None,
                            })
                            .collect(),
                    }),
                    ..<_>::default()
                },
            ),
            "default",
        )
    }

    fn gateway() -> Gateway {
        namespaced(Gateway::new("gw", GatewaySpec::default()), "default")
    }

    fn resolve(
        snapshot: &ResourceSnapshot,
        reports: &mut ReportMap,
    ) -> Vec<(String, Option<VirtualHostOptions>)> {
        let index = ResourceIndex::new(snapshot);
        DelegationResolver::new(&index)
            .compute_virtual_hosts(&gateway(), &snapshot.virtual_services, reports)
            .into_iter()
            .map(|entry| (entry.virtual_host.name, entry.virtual_host.options))
            .collect()
    }

    #[test]
    fn first_definition_wins() {
        let snapshot = ResourceSnapshot {
            virtual_services: vec![virtual_service("vs", &["first", "second"])],
            virtual_host_options: vec![
                header_option("first", "x-first"),
                header_option("second", "x-second"),
            ],
            ..<_>::default()
        };

        let hosts = resolve(&snapshot, &mut ReportMap::new());
        assert_eq!(
            Some(headers("x-first")),
            hosts[0].1.as_ref().unwrap().header_manipulation
        );
    }

    #[test]
    fn no_references_leaves_options_unset() {
        let snapshot = ResourceSnapshot {
            virtual_services: vec![virtual_service("vs", &[])],
            virtual_host_options: vec![header_option("first", "x-first")],
            ..<_>::default()
        };

        let hosts = resolve(&snapshot, &mut ReportMap::new());
        assert_eq!(vec![("default.vs".to_string(), None)], hosts);
    }

    #[test]
    fn missing_reference_only_affects_its_virtual_service() {
        let snapshot = ResourceSnapshot {
            virtual_services: vec![
                virtual_service("broken", &["missing"]),
                virtual_service("healthy", &["first"]),
            ],
            virtual_host_options: vec![header_option("first", "x-first")],
            ..<_>::default()
        };
        let mut reports = ReportMap::new();

        let hosts = resolve(&snapshot, &mut reports);

        assert_eq!(2, hosts.len());
        assert_eq!(None, hosts[0].1);
        assert!(hosts[1].1.is_some());

        let broken = reports
            .get(&ResourceKey::new("VirtualService", "default", "broken"))
            .unwrap();
        assert_eq!(
            vec!["virtual host option default.missing not found".to_string()],
            broken.errors
        );
        assert!(reports
            .get(&ResourceKey::new("VirtualService", "default", "healthy"))
            .unwrap()
            .errors
            .is_empty());
    }

    #[test]
    fn oldest_listener_option_wins() {
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
        use k8s_openapi::chrono::{TimeZone, Utc};

        let targeted = |name: &str, created: i64| {
            let mut option = header_option(name, name);
            option.spec.target_ref = Some(PolicyTargetReference {
                name: "gw".into(),
                section_name: None,
            });
            option.metadata.creation_timestamp =
                Some(Time(Utc.timestamp_opt(created, 0).unwrap()));
            option
        };
        let snapshot = ResourceSnapshot {
            virtual_host_options: vec![targeted("newer", 200), targeted("older", 100)],
            ..<_>::default()
        };
        let index = ResourceIndex::new(&snapshot);
        let mut reports = ReportMap::new();

        let winner = DelegationResolver::new(&index)
            .listener_options(&gateway(), "http", &mut reports)
            .unwrap();

        assert_eq!("older", winner.name());
        assert_eq!(
            1,
            reports
                .get(&ResourceKey::new("VirtualHostOption", "default", "newer"))
                .unwrap()
                .warnings
                .len()
        );
    }
}
