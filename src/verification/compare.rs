//! Similarity scoring between reference and sample text

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::normalize::normalize;

/// Outcome of a comparison against the configured threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// Stable lowercase name, used for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" => Ok(Verdict::Pass),
            "fail" => Ok(Verdict::Fail),
            other => Err(format!("unknown verdict '{other}'")),
        }
    }
}

/// Similarity score plus verdict for one comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Similarity in [0, 1], 1.0 meaning identical after normalization
    pub similarity: f64,
    pub verdict: Verdict,
}

/// Compares raw strings after normalization using an edit-distance ratio
#[derive(Debug, Clone)]
pub struct Comparator {
    threshold: f64,
}

impl Comparator {
    /// Exact match after normalization
    pub const DEFAULT_THRESHOLD: f64 = 1.0;

    /// Create a comparator with the default threshold
    pub fn new() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }

    /// Create a comparator with a custom threshold.
    ///
    /// Values outside [0, 1] are ignored and the default threshold is kept.
    pub fn with_threshold(threshold: f64) -> Self {
        let mut comparator = Self::new();
        comparator.set_threshold(threshold);
        comparator
    }

    /// Current pass threshold
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Update the pass threshold. Returns false (and keeps the old value)
    /// when `threshold` is not within [0, 1].
    pub fn set_threshold(&mut self, threshold: f64) -> bool {
        if (0.0..=1.0).contains(&threshold) {
            self.threshold = threshold;
            true
        } else {
            warn!(
                "Ignoring similarity threshold {} (must be within 0..=1), keeping {}",
                threshold, self.threshold
            );
            false
        }
    }

    /// Compare two raw strings. Both sides are normalized here, so callers
    /// pass the text exactly as it was selected.
    pub fn compare(&self, a: &str, b: &str) -> VerificationResult {
        let similarity = similarity(&normalize(a), &normalize(b));
        let verdict = if similarity >= self.threshold {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        VerificationResult {
            similarity,
            verdict,
        }
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new()
    }
}

/// Edit-distance ratio between two already-normalized strings.
///
/// `1 - levenshtein(a, b) / max(len(a), len(b), 1)` with lengths counted in
/// characters. Two empty strings score 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count()).max(1);
    let distance = strsim::levenshtein(a, b);

    (1.0 - distance as f64 / longest as f64).clamp(0.0, 1.0)
}
