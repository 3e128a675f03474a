// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Compact binary round-trip of a summary: a fixed header followed by the
//! ordered entry records.
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! version: u8, epsilon: f64, n: u64, entry_count: u32,
//! entry_count * (v: f64, g: u32, delta: u32, sample_count: u32, samples: sample_count * u64)
//! ```
//!
//! The reader rejects unknown versions and any content violating the summary
//! invariants; decoding never leaves partial state behind.

use crate::entry::Entry;
use bytes::{Buf, BufMut};

/// Version byte written in front of every encoded summary.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 1 + 8 + 8 + 4;
const ENTRY_FIXED_LEN: usize = 8 + 4 + 4 + 4;

/// Reasons a summary cannot be decoded.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The version byte is not understood by this reader.
    UnsupportedVersion(u8),
    /// The buffer ended before the announced contents.
    Truncated,
    /// The decoded contents violate a summary invariant.
    Invalid(&'static str),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnsupportedVersion(version) => {
                write!(f, "Unsupported summary format version {version}")
            }
            DecodeError::Truncated => write!(f, "Encoded summary is truncated"),
            DecodeError::Invalid(reason) => write!(f, "Encoded summary is invalid: {reason}"),
        }
    }
}

impl std::error::Error for DecodeError {}

pub(crate) fn encode<'a, I>(eps: f64, n: u64, entry_count: usize, entries: I) -> Vec<u8>
where
    I: Iterator<Item = &'a Entry>,
{
    let mut buf = Vec::with_capacity(HEADER_LEN + entry_count * (ENTRY_FIXED_LEN + 8));
    buf.put_u8(FORMAT_VERSION);
    buf.put_f64(eps);
    buf.put_u64(n);
    buf.put_u32(entry_count as u32);
    for entry in entries {
        buf.put_f64(entry.v);
        buf.put_u32(entry.g);
        buf.put_u32(entry.delta);
        buf.put_u32(entry.samples.len() as u32);
        for sample in &entry.samples {
            buf.put_u64(*sample);
        }
    }
    buf
}

pub(crate) fn decode(mut buf: &[u8]) -> Result<(f64, u64, Vec<Entry>), DecodeError> {
    if buf.remaining() < 1 {
        return Err(DecodeError::Truncated);
    }
    let version = buf.get_u8();
    if version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    if buf.remaining() < HEADER_LEN - 1 {
        return Err(DecodeError::Truncated);
    }
    let eps = buf.get_f64();
    let n = buf.get_u64();
    let entry_count = buf.get_u32();

    if !(eps.is_finite() && eps > 0.0 && eps < 0.5) {
        return Err(DecodeError::Invalid("epsilon out of range"));
    }

    let threshold = crate::merge_threshold(eps, n);
    let mut entries = Vec::with_capacity((entry_count as usize).min(1024));
    let mut total_g: u64 = 0;
    let mut prev_v = f64::NEG_INFINITY;
    for i in 0..entry_count {
        if buf.remaining() < ENTRY_FIXED_LEN {
            return Err(DecodeError::Truncated);
        }
        let v = buf.get_f64();
        let g = buf.get_u32();
        let delta = buf.get_u32();
        let sample_count = buf.get_u32() as usize;

        if !v.is_finite() {
            return Err(DecodeError::Invalid("entry value is not finite"));
        }
        if g == 0 {
            return Err(DecodeError::Invalid("entry gap must be at least one"));
        }
        if v < prev_v {
            return Err(DecodeError::Invalid("entries are not ordered by value"));
        }
        if i > 0 && g as u64 + delta as u64 > threshold + 1 {
            return Err(DecodeError::Invalid("entry exceeds the rank error budget"));
        }
        prev_v = v;

        if buf.remaining() < sample_count * 8 {
            return Err(DecodeError::Truncated);
        }
        let mut samples = Vec::with_capacity(sample_count.min(1024));
        for _ in 0..sample_count {
            samples.push(buf.get_u64());
        }

        total_g += g as u64;
        entries.push(Entry {
            v,
            g,
            delta,
            samples,
        });
    }

    if total_g != n {
        return Err(DecodeError::Invalid(
            "entry gaps do not add up to the observation count",
        ));
    }
    if buf.has_remaining() {
        return Err(DecodeError::Invalid("trailing bytes after the last entry"));
    }

    Ok((eps, n, entries))
}
