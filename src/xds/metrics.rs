/*
 * Copyright 2023 Google LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *       http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, IntGaugeVec};

use crate::metrics::{KIND_LABEL, RESULT_LABEL};

pub(crate) const NODE_LABEL: &str = "node";
pub(crate) const TYPE_LABEL: &str = "type";

pub(crate) const RESULT_OK: &str = "ok";
pub(crate) const RESULT_LIST_FAILED: &str = "list_failed";
pub(crate) const RESULT_CANCELLED: &str = "cancelled";

pub(crate) static RESYNCS: Lazy<IntCounterVec> = Lazy::new(|| {
    prometheus::register_int_counter_vec_with_registry! {
        prometheus::opts! {
            "xds_resyncs",
            "Total number of reconciliation passes, by outcome",
        },
        &[RESULT_LABEL],
        crate::metrics::registry(),
    }
    .unwrap()
});

pub(crate) static COLD_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    prometheus::register_int_counter_with_registry! {
        prometheus::opts! {
            "xds_cold_events",
            "Total number of input events received before discovery and secrets were both seen",
        },
        crate::metrics::registry(),
    }
    .unwrap()
});

pub(crate) static SNAPSHOT_RESOURCES: Lazy<IntGaugeVec> = Lazy::new(|| {
    prometheus::register_int_gauge_vec_with_registry! {
        prometheus::opts! {
            "xds_snapshot_resources",
            "Number of resources in the latest snapshot published for a node",
        },
        &[NODE_LABEL, TYPE_LABEL],
        crate::metrics::registry(),
    }
    .unwrap()
});

pub(crate) static STATUS_WRITE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    prometheus::register_int_counter_vec_with_registry! {
        prometheus::opts! {
            "status_write_failures",
            "Total number of failed resource status writes",
        },
        &[KIND_LABEL],
        crate::metrics::registry(),
    }
    .unwrap()
});

pub(crate) fn resyncs(result: &str) -> prometheus::IntCounter {
    RESYNCS.with_label_values(&[result])
}

pub(crate) fn snapshot_resources(node: &str, ty: &str) -> prometheus::IntGauge {
    SNAPSHOT_RESOURCES.with_label_values(&[node, ty])
}

pub(crate) fn status_write_failures(kind: &str) -> prometheus::IntCounter {
    STATUS_WRITE_FAILURES.with_label_values(&[kind])
}
