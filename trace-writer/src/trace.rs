// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use datadog_trace_protobuf::pb;

/// A trace as received from the sampler: the flat list of spans sharing a
/// trace ID, in ingestion order.
pub type Trace = Vec<pb::Span>;

/// Project a trace into its wire-ready form, computing the envelope
/// timestamps from the spans.
pub fn to_api_trace(trace: Trace) -> pb::ApiTrace {
    let trace_id = trace.first().map(|s| s.trace_id).unwrap_or(0);
    let start_time = trace.iter().map(|s| s.start).min().unwrap_or(0);
    let end_time = trace
        .iter()
        .map(|s| s.start.saturating_add(s.duration))
        .max()
        .unwrap_or(0);
    pb::ApiTrace {
        trace_id,
        spans: trace,
        start_time,
        end_time,
    }
}
