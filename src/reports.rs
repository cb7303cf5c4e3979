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

//! Per-resource outcomes collected during a reconciliation pass.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::resources::{
    Condition, ConditionStatus, Gateway, GatewayStatus, ListenerStatus, ResourceKey, RouteStatus,
};

/// Errors, warnings and conditions recorded against one resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub conditions: Vec<Condition>,
    /// Virtual hosts attached to each listener, for gateways.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub listeners: BTreeMap<String, u32>,
}

impl ResourceReport {
    /// Records `error` unless the same error was already recorded.
    pub fn add_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    /// Records `warning` unless the same warning was already recorded.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Sets `condition`, replacing any existing condition of the same type.
    pub fn set_condition(&mut self, condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|existing| existing.r#type == condition.r#type)
        {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }

    pub fn condition(&self, r#type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }

    pub fn is_accepted(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge(&mut self, other: Self) {
        for error in other.errors {
            self.add_error(error);
        }
        for warning in other.warnings {
            self.add_warning(warning);
        }
        for condition in other.conditions {
            self.set_condition(condition);
        }
        self.listeners.extend(other.listeners);
    }

    /// The `Accepted` condition summarising this report, followed by every
    /// other recorded condition.
    fn status_conditions(&self) -> Vec<Condition> {
        let accepted = if self.is_accepted() {
            Condition::new(
                Condition::ACCEPTED,
                ConditionStatus::True,
                Condition::REASON_ACCEPTED,
                None,
            )
        } else {
            Condition::new(
                Condition::ACCEPTED,
                ConditionStatus::False,
                Condition::REASON_INVALID,
                Some(self.errors.join("; ")),
            )
        };

        std::iter::once(accepted)
            .chain(
                self.conditions
                    .iter()
                    .filter(|c| c.r#type != Condition::ACCEPTED)
                    .cloned(),
            )
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{resource} is invalid: {}", errors.join("; "))]
pub struct ReportError {
    pub resource: ResourceKey,
    pub errors: Vec<String>,
}

/// Reports for every resource touched by a pass, keyed by resource identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportMap {
    reports: BTreeMap<ResourceKey, ResourceReport>,
}

impl ReportMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures `key` has a report, so that it receives a status even if
    /// nothing is recorded against it.
    pub fn accept(&mut self, key: ResourceKey) -> &mut ResourceReport {
        self.reports.entry(key).or_default()
    }

    pub fn accept_all(&mut self, keys: impl IntoIterator<Item = ResourceKey>) {
        for key in keys {
            self.accept(key);
        }
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ResourceReport> {
        self.reports.get(key)
    }

    pub fn add_error(&mut self, key: &ResourceKey, error: impl Into<String>) {
        self.accept(key.clone()).add_error(error);
    }

    pub fn add_warning(&mut self, key: &ResourceKey, warning: impl Into<String>) {
        self.accept(key.clone()).add_warning(warning);
    }

    /// Folds `other` into this map, uniting the reports of resources present
    /// in both.
    pub fn merge(&mut self, other: ReportMap) {
        for (key, report) in other.reports {
            self.reports.entry(key).or_default().merge(report);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &ResourceReport)> {
        self.reports.iter()
    }

    /// Fails on the first resource carrying any error or warning.
    pub fn validate_strict(&self) -> Result<(), ReportError> {
        match self
            .reports
            .iter()
            .find(|(_, report)| !report.errors.is_empty() || !report.warnings.is_empty())
        {
            Some((key, report)) => Err(ReportError {
                resource: key.clone(),
                errors: report
                    .errors
                    .iter()
                    .chain(&report.warnings)
                    .cloned()
                    .collect(),
            }),
            None => Ok(()),
        }
    }

    pub fn build_gateway_status(&self, gateway: &Gateway, controller_name: &str) -> GatewayStatus {
        let report = self
            .reports
            .get(&ResourceKey::of(gateway))
            .cloned()
            .unwrap_or_default();

        GatewayStatus {
            conditions: report.status_conditions(),
            listeners: gateway
                .spec
                .listeners
                .iter()
                .map(|listener| ListenerStatus {
                    name: listener.name.clone(),
                    attached_virtual_hosts: report
                        .listeners
                        .get(&listener.name)
                        .copied()
                        .unwrap_or_default(),
                })
                .collect(),
            reported_by: controller_name.to_owned(),
        }
    }

    pub fn build_route_status(&self, key: &ResourceKey, controller_name: &str) -> RouteStatus {
        let report = self.reports.get(key).cloned().unwrap_or_default();
        RouteStatus {
            conditions: report.status_conditions(),
            reported_by: controller_name.to_owned(),
        }
    }
}
