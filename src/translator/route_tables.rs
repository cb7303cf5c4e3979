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

//! Flattening of rules that delegate to route tables.

use crate::{
    query::ResourceIndex,
    reports::ReportMap,
    resources::{Action, KubeObject, Matcher, PathMatch, ResourceKey, Rule},
};

/// A rule that does not delegate, with the resource that declared it.
#[derive(Debug)]
pub struct FlatRule<'a> {
    pub source: &'a dyn KubeObject,
    pub rule: &'a Rule,
    /// The rule's effective matchers. Empty matchers inherit the prefix of
    /// the delegating rule, or match everything at the top level.
    pub matchers: Vec<Matcher>,
}

/// Expands `rules` declared by `source` into the non-delegating rules they
/// resolve to, in declaration order.
///
/// Missing route tables, delegation cycles and matchers outside the
/// delegating prefix are reported against the resource holding the
/// offending rule, and only that rule is dropped.
pub fn flatten_rules<'a>(
    index: &'a ResourceIndex,
    source: &'a dyn KubeObject,
    rules: &'a [Rule],
    reports: &mut ReportMap,
) -> Vec<FlatRule<'a>> {
    let mut flattener = Flattener {
        index,
        reports,
        path: vec![ResourceKey::of(source)],
        out: Vec::new(),
    };
    flattener.walk(source, rules, None);
    flattener.out
}

struct Flattener<'a, 'r> {
    index: &'a ResourceIndex,
    reports: &'r mut ReportMap,
    /// Resources on the current delegation chain.
    path: Vec<ResourceKey>,
    out: Vec<FlatRule<'a>>,
}

impl<'a> Flattener<'a, '_> {
    fn walk(&mut self, source: &'a dyn KubeObject, rules: &'a [Rule], parent_prefix: Option<&str>) {
        let key = ResourceKey::of(source);

        for rule in rules {
            let matchers = match (&*rule.matchers, parent_prefix) {
                ([], Some(prefix)) => vec![Matcher::prefix(prefix)],
                ([], None) => vec![Matcher::default()],
                (matchers, _) => matchers.to_vec(),
            };

            if let Some(prefix) = parent_prefix {
                if let Some(outside) = matchers
                    .iter()
                    .find(|matcher| !matcher.path.as_str().starts_with(prefix))
                {
                    self.reports.add_error(
                        &key,
                        format!(
                            "matcher {} must start with the delegating prefix {prefix}",
                            outside.path.as_str()
                        ),
                    );
                    continue;
                }
            }

            let Some(Action::Delegate(reference)) = &rule.action else {
                self.out.push(FlatRule {
                    source,
                    rule,
                    matchers,
                });
                continue;
            };

            let prefix = match &*matchers {
                [Matcher {
                    path: PathMatch::Prefix(prefix),
                    ..
                }] => prefix.as_str(),
                _ => {
                    self.reports.add_error(
                        &key,
                        "a delegating rule must have exactly one prefix matcher",
                    );
                    continue;
                }
            };

            let Some(table) = self.index.route_table(reference, source.namespace()) else {
                let reference = reference.qualified(source.namespace());
                self.reports
                    .add_error(&key, format!("route table {reference} not found"));
                continue;
            };

            let table_key = ResourceKey::of(table);
            if self.path.contains(&table_key) {
                let chain = self
                    .path
                    .iter()
                    .chain(Some(&table_key))
                    .map(|key| format!("{}.{}", key.namespace, key.name))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                self.reports
                    .add_error(&key, format!("delegation cycle detected: {chain}"));
                continue;
            }

            if !rule.filters.is_empty() {
                self.reports
                    .add_warning(&key, "filters on delegating rules are ignored");
            }

            self.reports.accept(table_key.clone());
            self.path.push(table_key);
            self.walk(table, &table.spec.routes, Some(prefix));
            self.path.pop();
        }
    }
}
