//! Text canonicalization applied before comparison

use caseless::default_case_fold_str;

/// Canonical comparison form of `text`.
///
/// Applies Unicode full case folding and keeps only letters and digits.
/// Letters from any script survive; punctuation, whitespace and combining
/// marks do not. Folding runs first so that characters expanding into a
/// letter plus a combining mark (e.g. `İ`) still normalize to a fixed point.
pub fn normalize(text: &str) -> String {
    default_case_fold_str(text)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}
