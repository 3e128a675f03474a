// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use datadog_trace_protobuf::pb;

/// Accumulates API traces up to the configured span cap.
///
/// Only the writer loop touches the buffer, so it needs no synchronization.
/// The writer splits oversized traces before pushing; a push that takes the
/// span count over the cap is a bug, not a data condition, and aborts.
#[derive(Debug)]
pub struct PayloadBuffer {
    traces: Vec<pb::ApiTrace>,
    spans_in_buffer: usize,
    max_spans_per_payload: usize,
}

impl PayloadBuffer {
    pub fn new(max_spans_per_payload: usize) -> PayloadBuffer {
        PayloadBuffer {
            traces: Vec::new(),
            spans_in_buffer: 0,
            max_spans_per_payload,
        }
    }

    pub fn push(&mut self, trace: pb::ApiTrace) {
        self.spans_in_buffer += trace.spans.len();
        self.traces.push(trace);

        // Should never happen thanks to overflow detection in handle_trace,
        // but just in case
        if self.spans_in_buffer > self.max_spans_per_payload {
            panic!("number of spans in buffer went over the limit");
        }
    }

    pub fn span_count(&self) -> usize {
        self.spans_in_buffer
    }

    pub fn trace_count(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.spans_in_buffer == self.max_spans_per_payload
    }

    /// Drain the buffered traces, resetting the span count.
    pub fn take(&mut self) -> Vec<pb::ApiTrace> {
        self.spans_in_buffer = 0;
        std::mem::take(&mut self.traces)
    }
}
