// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Contiguous-array summary representation.

use crate::codec::{self, DecodeError};
use crate::entry::{compress_entries, merge_sorted, quantile_scan, Entry};
use crate::{compress_period, merge_threshold, new_entry_delta, EPSILON};

/// A Greenwald-Khanna ε-approximate quantile summary keeping its entries in
/// a contiguous slice.
///
/// Insertion shifts the tail of the slice, but the compact layout and the
/// simpler serialization win over [`crate::Summary`] for small entry counts.
/// Given identical insertion sequences and ε, both representations answer
/// every quantile identically.
#[derive(Clone, Debug)]
pub struct SliceSummary {
    /// The ordered entries of the summary. Exposed so callers can
    /// pre-allocate before a burst of insertions.
    pub entries: Vec<Entry>,
    eps: f64,
    n: u64,
    pending_inserts: u32,
}

impl Default for SliceSummary {
    fn default() -> SliceSummary {
        SliceSummary::new()
    }
}

impl SliceSummary {
    /// Create an empty summary with the default [`EPSILON`].
    pub fn new() -> SliceSummary {
        SliceSummary::with_epsilon(EPSILON)
    }

    /// Create an empty summary with the given target rank error.
    pub fn with_epsilon(eps: f64) -> SliceSummary {
        assert!(
            eps > 0.0 && eps < 0.5,
            "target rank error must be in (0, 0.5)"
        );
        SliceSummary {
            entries: Vec::new(),
            eps,
            n: 0,
            pending_inserts: 0,
        }
    }

    /// The target rank error of this summary.
    pub fn epsilon(&self) -> f64 {
        self.eps
    }

    /// Number of observations recorded by this summary.
    pub fn count(&self) -> u64 {
        self.n
    }

    /// Whether or not this summary is empty.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Record one observation. Non-finite values are discarded as they have
    /// no place in a value ordering.
    pub fn insert(&mut self, v: f64, sample_id: u64) {
        if !v.is_finite() {
            return;
        }

        // insert after any entries of equal value
        let pos = self.entries.partition_point(|e| e.v <= v);
        let delta = if pos == 0 || pos == self.entries.len() {
            0
        } else {
            new_entry_delta(self.eps, self.n)
        };
        self.entries.insert(
            pos,
            Entry {
                v,
                g: 1,
                delta,
                samples: vec![sample_id],
            },
        );
        self.n += 1;

        self.pending_inserts += 1;
        if self.pending_inserts >= compress_period(self.eps) {
            self.compress();
            self.pending_inserts = 0;
        }
    }

    fn compress(&mut self) {
        compress_entries(&mut self.entries, merge_threshold(self.eps, self.n));
    }

    /// Return a value whose true rank is within `εN` of `⌈qN⌉`, along with
    /// the sample identifiers stored on the answering entry. `q <= 0` returns
    /// the minimum observation, `q >= 1` the maximum, and an empty summary
    /// has no quantiles.
    pub fn quantile(&self, q: f64) -> Option<(f64, &[u64])> {
        quantile_scan(self.entries.iter(), self.eps, self.n, q)
            .map(|entry| (entry.v, entry.samples.as_slice()))
    }

    /// Produce a summary approximating the union of the two input streams.
    /// The rank error of the result is bounded by the worse of the two
    /// inputs plus ε.
    pub fn merge(&self, other: &SliceSummary) -> SliceSummary {
        let mut merged = SliceSummary {
            entries: merge_sorted(self.entries.clone(), other.entries.clone()),
            eps: self.eps.max(other.eps),
            n: self.n + other.n,
            pending_inserts: 0,
        };
        merged.compress();
        merged
    }

    /// Serialize the summary into the stable binary representation of
    /// [`crate::codec`].
    pub fn encode_to_vec(&self) -> Vec<u8> {
        codec::encode(self.eps, self.n, self.entries.len(), self.entries.iter())
    }

    /// Rebuild a summary from [`SliceSummary::encode_to_vec`] output,
    /// refusing versions this reader does not understand and content
    /// violating the summary invariants.
    pub fn decode(buf: &[u8]) -> Result<SliceSummary, DecodeError> {
        let (eps, n, entries) = codec::decode(buf)?;
        Ok(SliceSummary {
            entries,
            eps,
            n,
            pending_inserts: 0,
        })
    }
}
