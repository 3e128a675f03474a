// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The element type shared by both summary representations and the
//! sequence-level operations on ordered runs of entries.

/// One element of a quantile summary.
///
/// An entry covers `g` of the observed values with `v` as their
/// representative, and its position in the summary diverges from the true
/// rank of `v` by at most `delta`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Entry {
    /// The observed value.
    pub v: f64,
    /// Rank gap: the number of observed values this entry covers.
    pub g: u32,
    /// Maximum rank error permitted on this entry.
    pub delta: u32,
    /// Sample identifiers of the observations this entry covers, in
    /// observation order.
    pub samples: Vec<u64>,
}

/// Merge adjacent entries, walking right to left, while the rank error
/// budget `threshold` allows it. An entry is folded into its right neighbor,
/// which keeps tail statistics sharper. The first and last entries are never
/// folded away.
pub(crate) fn compress_entries(entries: &mut Vec<Entry>, threshold: u64) {
    if entries.len() < 3 {
        return;
    }

    let mut merged: Vec<Entry> = Vec::with_capacity(entries.len());
    let mut right = entries.pop().unwrap();
    while entries.len() > 1 {
        let mut left = entries.pop().unwrap();
        if left.g as u64 + right.g as u64 + right.delta as u64 <= threshold {
            right.g += left.g;
            let mut samples = std::mem::take(&mut left.samples);
            samples.append(&mut right.samples);
            right.samples = samples;
        } else {
            merged.push(std::mem::replace(&mut right, left));
        }
    }
    merged.push(right);
    if let Some(first) = entries.pop() {
        merged.push(first);
    }
    merged.reverse();
    *entries = merged;
}

/// Merge two runs of entries ordered by value into one; entries from `a`
/// come first among equal values.
pub(crate) fn merge_sorted(a: Vec<Entry>, b: Vec<Entry>) -> Vec<Entry> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut a = a.into_iter().peekable();
    let mut b = b.into_iter().peekable();
    loop {
        let take_a = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => x.v <= y.v,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        if take_a {
            out.push(a.next().unwrap());
        } else {
            out.push(b.next().unwrap());
        }
    }
    out
}

/// Select the entry answering quantile `q` over `n` observations.
///
/// Returns the last entry whose maximum rank `cumG + Δ` still fits within
/// `⌈qN⌉ + εN`; with the summary invariant `g + Δ ≤ 2εN` its true rank is
/// within `εN` of the requested one. `q <= 0` selects the minimum entry and
/// `q >= 1` the maximum.
pub(crate) fn quantile_scan<'a, I>(mut entries: I, eps: f64, n: u64, q: f64) -> Option<&'a Entry>
where
    I: Iterator<Item = &'a Entry>,
{
    if n == 0 {
        return None;
    }
    if q <= 0.0 {
        return entries.next();
    }
    if q >= 1.0 {
        return entries.last();
    }

    let rank = (q * n as f64).ceil() as u64;
    let budget = rank as f64 + eps * n as f64;

    let mut cum_g: u64 = 0;
    let mut chosen = None;
    for entry in entries {
        cum_g += entry.g as u64;
        if chosen.is_some() && (cum_g + entry.delta as u64) as f64 > budget {
            break;
        }
        chosen = Some(entry);
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(v: f64, g: u32, delta: u32) -> Entry {
        Entry {
            v,
            g,
            delta,
            samples: vec![v as u64],
        }
    }

    #[test]
    fn test_compress_respects_threshold() {
        let mut entries = vec![entry(1.0, 1, 0), entry(2.0, 1, 0), entry(3.0, 1, 0), entry(4.0, 1, 0)];
        compress_entries(&mut entries, 2);

        // 3.0 folds into 4.0; folding 2.0 as well would blow the budget
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].v, 1.0);
        assert_eq!(entries[1].v, 2.0);
        assert_eq!(entries[2].v, 4.0);
        assert_eq!(entries[2].g, 2);
        assert_eq!(entries[2].samples, vec![3, 4]);
    }

    #[test]
    fn test_compress_keeps_extremes() {
        let mut entries = vec![entry(1.0, 1, 0), entry(2.0, 1, 0), entry(3.0, 1, 0)];
        compress_entries(&mut entries, u64::MAX);

        assert_eq!(entries.first().unwrap().v, 1.0);
        assert_eq!(entries.last().unwrap().v, 3.0);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_compress_too_small_to_merge() {
        let mut entries = vec![entry(1.0, 1, 0), entry(2.0, 1, 0)];
        compress_entries(&mut entries, u64::MAX);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_merge_sorted_is_stable() {
        let a = vec![entry(1.0, 1, 0), entry(3.0, 2, 0)];
        let b = vec![entry(1.0, 4, 0), entry(2.0, 1, 0)];
        let merged = merge_sorted(a, b);

        let shape: Vec<(f64, u32)> = merged.iter().map(|e| (e.v, e.g)).collect();
        assert_eq!(shape, vec![(1.0, 1), (1.0, 4), (2.0, 1), (3.0, 2)]);
    }

    #[test]
    fn test_quantile_scan_exact_entries() {
        let entries: Vec<Entry> = (1..=10).map(|i| entry(i as f64, 1, 0)).collect();
        let n = 10;

        let median = quantile_scan(entries.iter(), 0.01, n, 0.5).unwrap();
        assert_eq!(median.v, 5.0);
        assert_eq!(quantile_scan(entries.iter(), 0.01, n, 0.0).unwrap().v, 1.0);
        assert_eq!(quantile_scan(entries.iter(), 0.01, n, 1.0).unwrap().v, 10.0);
    }

    #[test]
    fn test_quantile_scan_empty() {
        let entries: Vec<Entry> = Vec::new();
        assert!(quantile_scan(entries.iter(), 0.01, 0, 0.5).is_none());
    }
}
