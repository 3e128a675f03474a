// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span filters applied between normalization and aggregation.

mod resource;

use datadog_trace_protobuf::pb;

pub use resource::ResourceFilter;

/// Filter is the interface implemented by all span filters.
pub trait Filter: Send + Sync {
    /// Whether the span passes the filter and should be kept.
    fn keep(&self, span: &pb::Span) -> bool;

    /// Apply the filter's search/replace rules to every span of the trace.
    fn apply_regex(&self, trace: &mut [pb::Span]);
}

/// Build the registered filters from the configured rule sets.
pub fn setup(
    ignore_resources: &[String],
    replace_rules: &[(String, String)],
) -> Vec<Box<dyn Filter>> {
    vec![Box::new(ResourceFilter::new(ignore_resources, replace_rules))]
}
