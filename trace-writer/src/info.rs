// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A point-in-time snapshot of the writer counters, as published at every
/// telemetry tick and exposed through the info registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TraceWriterInfo {
    pub payloads: u64,
    pub traces: u64,
    pub spans: u64,
    pub bytes: u64,
    pub retries: u64,
    pub errors: u64,
}

/// Live writer counters, shared between the writer loop and the sender-event
/// consumer. All access is atomic read-modify-write; publication swaps every
/// counter back to zero.
#[derive(Debug, Default)]
pub struct TraceWriterStats {
    payloads: AtomicU64,
    traces: AtomicU64,
    spans: AtomicU64,
    bytes: AtomicU64,
    retries: AtomicU64,
    errors: AtomicU64,
}

impl TraceWriterStats {
    pub fn add_payloads(&self, n: u64) {
        self.payloads.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_traces(&self, n: u64) {
        self.traces.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_spans(&self, n: u64) {
        self.spans.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_retries(&self, n: u64) {
        self.retries.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_errors(&self, n: u64) {
        self.errors.fetch_add(n, Ordering::Relaxed);
    }

    /// Read the counters without resetting them.
    pub fn snapshot(&self) -> TraceWriterInfo {
        TraceWriterInfo {
            payloads: self.payloads.load(Ordering::Relaxed),
            traces: self.traces.load(Ordering::Relaxed),
            spans: self.spans.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Load the counters and reset them for the next publication.
    pub fn reset(&self) -> TraceWriterInfo {
        TraceWriterInfo {
            payloads: self.payloads.swap(0, Ordering::Relaxed),
            traces: self.traces.swap(0, Ordering::Relaxed),
            spans: self.spans.swap(0, Ordering::Relaxed),
            bytes: self.bytes.swap(0, Ordering::Relaxed),
            retries: self.retries.swap(0, Ordering::Relaxed),
            errors: self.errors.swap(0, Ordering::Relaxed),
        }
    }
}

/// Shared handle to the last published writer snapshot, for a health
/// endpoint to expose.
pub type TraceWriterInfoArc = Arc<ArcSwap<TraceWriterInfo>>;

/// The set of tracer SDK languages seen by the receiver, reported on every
/// trace payload as a pipe-joined header.
#[derive(Debug, Default)]
pub struct Languages(RwLock<BTreeSet<String>>);

impl Languages {
    pub fn add(&self, lang: &str) {
        #[allow(clippy::unwrap_used)]
        let mut languages = self.0.write().unwrap();
        if !languages.contains(lang) {
            languages.insert(lang.to_string());
        }
    }

    /// The pipe-joined header value, languages in lexical order.
    pub fn header_value(&self) -> String {
        #[allow(clippy::unwrap_used)]
        let languages = self.0.read().unwrap();
        languages.iter().cloned().collect::<Vec<_>>().join("|")
    }
}
