// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0. This product includes software
// developed at Datadog (https://www.datadoghq.com/). Copyright 2023-Present
// Datadog, Inc.

use crate::normalize_utils::{self, MAX_NAME_LEN, MAX_TYPE_LEN};
use datadog_trace_protobuf::pb;
use log::debug;
use std::collections::HashSet;
use std::time::SystemTime;

// an arbitrary cutoff to spot weird-looking values
// nanoseconds since epoch on Jan 1, 2000
const YEAR_2000_NANOSEC_TS: i64 = 946_684_800_000_000_000;

// the maximum amount of time in the future we tolerate for span end dates
const MAX_END_DATE_OFFSET_NANOS: i64 = 10 * 60 * 1_000_000_000;

/// normalize_span makes sure a span is properly initialized and encloses the
/// minimum required info, and returns an error describing why the span must
/// be dropped otherwise.
pub fn normalize_span(s: &mut pb::Span) -> anyhow::Result<()> {
    // service shall comply with tag normalization as it's eventually a tag
    s.service = normalize_utils::normalize_service(&s.service)?;

    anyhow::ensure!(!s.name.is_empty(), "Normalizer Error: Empty span name.");
    anyhow::ensure!(
        s.name.len() <= MAX_NAME_LEN,
        "Normalizer Error: Span name longer than {MAX_NAME_LEN} characters."
    );
    // name shall comply with metric name normalization
    s.name = normalize_utils::normalize_metric_name(&s.name)?;

    anyhow::ensure!(!s.resource.is_empty(), "Normalizer Error: Empty resource name.");

    // TraceID & SpanID should be set in the client because they uniquely
    // define the traces and associate them into traces
    anyhow::ensure!(s.trace_id != 0, "Normalizer Error: TraceID is zero.");
    anyhow::ensure!(s.span_id != 0, "Normalizer Error: SpanID is zero.");

    // ParentID, TraceID and SpanID set in the client could be the same
    // Supporting the ParentID == TraceID == SpanID for the root span, is compliant
    // with the Zipkin implementation. Furthermore, as described in the PR
    // https://github.com/openzipkin/zipkin/pull/851 the constraint that the
    // root span's ``trace id = span id`` has been removed
    if s.parent_id == s.trace_id && s.parent_id == s.span_id {
        s.parent_id = 0;
        debug!(
            "ParentID, TraceID and SpanID are the same; ParentID set to 0: {}",
            s.trace_id
        );
    }

    // Start & Duration as nanoseconds timestamps. If start is very little,
    // less than year 2000, it's probably a unit issue so discard.
    anyhow::ensure!(
        s.start >= YEAR_2000_NANOSEC_TS,
        "Normalizer Error: Start date is invalid (must be a nanosecond epoch)."
    );

    // If the end date is too far away in the future, it's probably a mistake.
    let now_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|t| t.as_nanos() as i64)
        .map_err(|e| anyhow::anyhow!("Normalizer Error: {e}"))?;
    let end = s.start.checked_add(s.duration);
    anyhow::ensure!(
        matches!(end, Some(end) if end <= now_nanos + MAX_END_DATE_OFFSET_NANOS),
        "Normalizer Error: Span end date is more than 10 minutes in the future."
    );

    anyhow::ensure!(
        s.duration > 0,
        "Normalizer Error: Durations need to be strictly positive."
    );

    anyhow::ensure!(
        s.r#type.len() <= MAX_TYPE_LEN,
        "Normalizer Error: Span type longer than {MAX_TYPE_LEN} characters."
    );

    // Environment
    if let Some(env) = s.meta.get("env") {
        if let Ok(normalized) = normalize_utils::normalize_tag(env) {
            s.meta.insert("env".to_string(), normalized);
        }
    }

    // Status Code
    if let Some(code) = s.meta.get("http.status_code") {
        if !is_valid_status_code(code) {
            debug!("Drop invalid meta `http.status_code`: {code}");
            s.meta.remove("http.status_code");
        }
    }

    Ok(())
}

/// normalize_trace takes a trace and
/// * rejects the trace if it is empty
/// * rejects the trace if there is a trace ID discrepancy between 2 spans
/// * rejects the trace if two spans have the same span ID
/// * rejects traces where at least one span cannot be normalized
pub fn normalize_trace(trace: &mut [pb::Span]) -> anyhow::Result<()> {
    anyhow::ensure!(!trace.is_empty(), "Normalize Trace Error: Trace is empty.");

    let trace_id = trace[0].trace_id;
    let mut span_ids: HashSet<u64> = HashSet::with_capacity(trace.len());

    for span in trace.iter_mut() {
        anyhow::ensure!(
            span_ids.insert(span.span_id),
            "Normalize Trace Error: Duplicate span ID {} within trace {}.",
            span.span_id,
            trace_id
        );
        anyhow::ensure!(
            span.trace_id == trace_id,
            "Normalize Trace Error: Trace ID mismatch {:x} != {:x}.",
            trace_id,
            span.trace_id
        );
        normalize_span(span)?;
    }
    Ok(())
}

pub(crate) fn is_valid_status_code(sc: &str) -> bool {
    if let Ok(code) = sc.parse::<i64>() {
        return (100..600).contains(&code);
    }
    false
}
