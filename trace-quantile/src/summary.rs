// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The default, skip-list backed summary representation.

use crate::codec::{self, DecodeError};
use crate::entry::{compress_entries, merge_sorted, quantile_scan, Entry};
use crate::skiplist::SkipList;
use crate::{compress_period, merge_threshold, new_entry_delta, EPSILON};

/// A Greenwald-Khanna ε-approximate quantile summary backed by a skip-list,
/// which gives expected-logarithmic insertion at the cost of per-node
/// overhead.
///
/// For any quantile `q` the returned value has a true rank within `εN` of
/// `⌈qN⌉`, together with the sample identifiers the answering entry covers.
#[derive(Debug)]
pub struct Summary {
    data: SkipList,
    eps: f64,
    n: u64,
    pending_inserts: u32,
}

impl Default for Summary {
    fn default() -> Summary {
        Summary::new()
    }
}

impl Summary {
    /// Create an empty summary with the default [`EPSILON`].
    pub fn new() -> Summary {
        Summary::with_epsilon(EPSILON)
    }

    /// Create an empty summary with the given target rank error.
    pub fn with_epsilon(eps: f64) -> Summary {
        assert!(
            eps > 0.0 && eps < 0.5,
            "target rank error must be in (0, 0.5)"
        );
        Summary {
            data: SkipList::new(),
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

    /// Number of entries currently retained; bounded by
    /// `O((1/ε) · log(εN))`.
    pub fn entry_count(&self) -> usize {
        self.data.len()
    }

    /// Record one observation. Non-finite values are discarded as they have
    /// no place in a value ordering.
    pub fn insert(&mut self, v: f64, sample_id: u64) {
        if !v.is_finite() {
            return;
        }

        // A new minimum or maximum carries no rank uncertainty.
        let delta = if self.is_new_extreme(v) {
            0
        } else {
            new_entry_delta(self.eps, self.n)
        };
        self.data.insert(Entry {
            v,
            g: 1,
            delta,
            samples: vec![sample_id],
        });
        self.n += 1;

        self.pending_inserts += 1;
        if self.pending_inserts >= compress_period(self.eps) {
            self.compress();
            self.pending_inserts = 0;
        }
    }

    fn is_new_extreme(&self, v: f64) -> bool {
        match (self.data.first(), self.data.last()) {
            (Some(first), Some(last)) => v < first.v || v >= last.v,
            _ => true,
        }
    }

    fn compress(&mut self) {
        if self.data.len() < 3 {
            return;
        }
        let mut entries = self.data.take_entries();
        compress_entries(&mut entries, merge_threshold(self.eps, self.n));
        self.data = SkipList::from_sorted(entries);
    }

    /// Return a value whose true rank is within `εN` of `⌈qN⌉`, along with
    /// the sample identifiers stored on the answering entry. `q <= 0` returns
    /// the minimum observation, `q >= 1` the maximum, and an empty summary
    /// has no quantiles.
    pub fn quantile(&self, q: f64) -> Option<(f64, &[u64])> {
        quantile_scan(self.data.iter(), self.eps, self.n, q)
            .map(|entry| (entry.v, entry.samples.as_slice()))
    }

    /// Produce a summary approximating the union of the two input streams.
    /// The rank error of the result is bounded by the worse of the two
    /// inputs plus ε.
    pub fn merge(&self, other: &Summary) -> Summary {
        let entries = merge_sorted(self.entries(), other.entries());
        let mut merged = Summary {
            data: SkipList::from_sorted(entries),
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
        codec::encode(self.eps, self.n, self.data.len(), self.data.iter())
    }

    /// Rebuild a summary from [`Summary::encode_to_vec`] output, refusing
    /// versions this reader does not understand and content violating the
    /// summary invariants.
    pub fn decode(buf: &[u8]) -> Result<Summary, DecodeError> {
        let (eps, n, entries) = codec::decode(buf)?;
        Ok(Summary {
            data: SkipList::from_sorted(entries),
            eps,
            n,
            pending_inserts: 0,
        })
    }

    pub(crate) fn entries(&self) -> Vec<Entry> {
        self.data.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn shuffled(range: std::ops::RangeInclusive<u64>) -> Vec<u64> {
        let mut values: Vec<u64> = range.collect();
        values.shuffle(&mut rand::thread_rng());
        values
    }

    fn summary_of(values: &[u64]) -> Summary {
        let mut summary = Summary::new();
        for v in values {
            summary.insert(*v as f64, *v);
        }
        summary
    }

    #[test]
    fn test_empty_summary() {
        let summary = Summary::new();
        assert!(summary.is_empty());
        assert_eq!(summary.count(), 0);
        assert!(summary.quantile(0.5).is_none());
    }

    #[test]
    fn test_non_finite_values_ignored() {
        let mut summary = Summary::new();
        summary.insert(f64::NAN, 1);
        summary.insert(f64::INFINITY, 2);
        summary.insert(f64::NEG_INFINITY, 3);
        assert!(summary.is_empty());
    }

    #[test]
    fn test_rank_accuracy() {
        let values = shuffled(1..=10_000);
        let summary = summary_of(&values);
        assert_eq!(summary.count(), 10_000);

        for q in [0.5, 0.9, 0.99] {
            let (v, _) = summary.quantile(q).unwrap();
            let target = q * 10_000.0;
            assert!(
                (v - target).abs() <= 100.0,
                "quantile {q} returned {v}, more than 100 ranks from {target}"
            );
        }
    }

    #[test]
    fn test_monotonicity() {
        let values = shuffled(1..=5_000);
        let summary = summary_of(&values);

        let mut prev = f64::NEG_INFINITY;
        for i in 0..=20 {
            let q = i as f64 / 20.0;
            let (v, _) = summary.quantile(q).unwrap();
            assert!(v >= prev, "quantile({q}) = {v} went below {prev}");
            prev = v;
        }
    }

    #[test]
    fn test_boundaries() {
        let values = shuffled(1..=1_000);
        let summary = summary_of(&values);

        assert_eq!(summary.quantile(0.0).unwrap().0, 1.0);
        assert_eq!(summary.quantile(1.0).unwrap().0, 1_000.0);
    }

    #[test]
    fn test_quantile_returns_covered_samples() {
        let values = shuffled(1..=2_000);
        let summary = summary_of(&values);

        let (v, samples) = summary.quantile(0.5).unwrap();
        assert!(!samples.is_empty());
        // sample ids were chosen equal to the inserted values
        assert!(samples.iter().all(|s| (1..=2_000).contains(s)));
        assert!(samples.contains(&(v as u64)));
    }

    #[test]
    fn test_merge_disjoint_streams() {
        let a = summary_of(&shuffled(1..=5_000));
        let b = summary_of(&shuffled(5_001..=10_000));

        let merged = a.merge(&b);
        assert_eq!(merged.count(), 10_000);

        let (median, _) = merged.quantile(0.5).unwrap();
        assert!(
            (median - 5_000.0).abs() <= 200.0,
            "median of merged summaries was {median}"
        );
        assert_eq!(merged.quantile(0.0).unwrap().0, 1.0);
        assert_eq!(merged.quantile(1.0).unwrap().0, 10_000.0);
    }

    #[test]
    fn test_merge_with_empty() {
        let a = summary_of(&shuffled(1..=100));
        let empty = Summary::new();

        let merged = a.merge(&empty);
        assert_eq!(merged.count(), 100);
        assert_eq!(merged.quantile(1.0).unwrap().0, 100.0);
    }

    #[test]
    fn test_serialization_round_trip() {
        let values = shuffled(1..=3_000);
        let summary = summary_of(&values);

        let encoded = summary.encode_to_vec();
        let decoded = Summary::decode(&encoded).unwrap();

        assert_eq!(decoded.count(), summary.count());
        assert_eq!(decoded.epsilon(), summary.epsilon());
        for i in 0..=100 {
            let q = i as f64 / 100.0;
            assert_eq!(decoded.quantile(q), summary.quantile(q));
        }
    }

    #[test]
    fn test_decode_rejects_other_versions() {
        let summary = summary_of(&shuffled(1..=10));
        let mut encoded = summary.encode_to_vec();
        encoded[0] = 2;
        assert!(matches!(
            Summary::decode(&encoded),
            Err(DecodeError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_memory_bound() {
        // entry count stays within c * (1/eps) * ln(eps * N) with c = 3
        let values = shuffled(1..=100_000);
        let summary = summary_of(&values);

        let n = summary.count() as f64;
        let eps = summary.epsilon();
        let bound = 3.0 * (1.0 / eps) * (eps * n).ln();
        assert!(
            (summary.entry_count() as f64) <= bound,
            "{} entries exceeds the bound of {bound}",
            summary.entry_count()
        );
    }

    #[test]
    fn test_samples_track_gaps() {
        let values = shuffled(1..=10_000);
        let summary = summary_of(&values);

        for entry in summary.entries() {
            assert_eq!(entry.samples.len(), entry.g as usize);
        }
    }
}
