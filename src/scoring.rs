//! Similarity scoring between a local name and a candidate key.
//!
//! This module contains:
//! - Threshold presets and the validated `Threshold` type
//! - The sequence-matcher ratio (longest matching blocks over chars)
//! - The metric switch used by the engine

use rustc_hash::FxHashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

// ============================================================================
// Score Thresholds
// ============================================================================

/// Normal accuracy preset
pub const ACCURACY_NORMAL: f64 = 0.80;

/// Precise accuracy preset
pub const ACCURACY_PRECISE: f64 = 0.95;

/// Minimum ratio (exclusive) a candidate must exceed to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    pub const NORMAL: Threshold = Threshold(ACCURACY_NORMAL);
    pub const PRECISE: Threshold = Threshold(ACCURACY_PRECISE);

    /// Accepts any value in the open interval (0, 1).
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value > 0.0 && value < 1.0 {
            Ok(Threshold(value))
        } else {
            Err(ConfigError::InvalidThreshold(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Strict comparison: a ratio equal to the threshold is rejected.
    pub fn accepts(self, ratio: f64) -> bool {
        ratio > self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::NORMAL
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    /// 2*M/T over recursively found longest matching blocks
    #[default]
    SequenceMatcher,
    /// 1 - edit distance / longer length
    Levenshtein,
}

impl SimilarityMetric {
    pub fn score(self, a: &str, b: &str) -> f64 {
        match self {
            SimilarityMetric::SequenceMatcher => sequence_ratio(a, b),
            SimilarityMetric::Levenshtein => strsim::normalized_levenshtein(a, b),
        }
    }

    pub fn matches(self, a: &str, b: &str, threshold: Threshold) -> Verdict {
        let ratio = self.score(a, b);
        Verdict {
            ratio,
            accepted: threshold.accepts(ratio),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequence" | "sequence-matcher" => Ok(SimilarityMetric::SequenceMatcher),
            "levenshtein" => Ok(SimilarityMetric::Levenshtein),
            other => Err(format!("unknown similarity metric '{}'", other)),
        }
    }
}

/// Ratio and pass/fail decision for one comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub ratio: f64,
    pub accepted: bool,
}

/// Score with the default metric.
pub fn score(a: &str, b: &str) -> f64 {
    SimilarityMetric::default().score(a, b)
}

/// Score with the default metric and decide against `threshold`.
pub fn matches(a: &str, b: &str, threshold: Threshold) -> Verdict {
    SimilarityMetric::default().matches(a, b, threshold)
}

// ============================================================================
// Sequence Matcher
// ============================================================================

/// Similarity ratio in [0, 1] from the total size of the longest matching
/// blocks. Two empty strings are identical (1.0).
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Sum of matching block sizes. Finds the longest block, then recurses into
/// the unmatched spans on either side of it.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut b2j: FxHashMap<char, Vec<usize>> = FxHashMap::default();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut matched = 0;
    let mut spans = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = spans.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            spans.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            spans.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block of a[alo..ahi] and b[blo..bhi] as (i, j, len).
/// Ties go to the block that starts earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b2j: &FxHashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);
    // j2len[j] = length of the match ending at a[i - 1] and b[j]
    let mut j2len: FxHashMap<usize, usize> = FxHashMap::default();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next: FxHashMap<usize, usize> = FxHashMap::default();
        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| j2len.get(&prev))
                    .copied()
                    .unwrap_or(0)
                    + 1;
                next.insert(j, k);
                if k > best_len {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_len = k;
                }
            }
        }
        j2len = next;
    }

    (best_i, best_j, best_len)
}
