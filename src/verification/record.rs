//! Persisted outcome of a completed verification attempt

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::compare::{Verdict, VerificationResult};

/// One entry of the verification history.
///
/// Created once per completed attempt and never modified afterwards; the
/// fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    image_path: PathBuf,
    reference_text: String,
    sample_text: String,
    similarity: f64,
    verdict: Verdict,
    timestamp: DateTime<Local>,
}

impl VerificationRecord {
    /// Build a record from the raw selected texts and their comparison result
    pub fn new(
        image_path: PathBuf,
        reference_text: impl Into<String>,
        sample_text: impl Into<String>,
        result: VerificationResult,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            image_path,
            reference_text: reference_text.into(),
            sample_text: sample_text.into(),
            similarity: result.similarity,
            verdict: result.verdict,
            timestamp,
        }
    }

    /// Where the annotated image is (or will be) stored
    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn reference_text(&self) -> &str {
        &self.reference_text
    }

    pub fn sample_text(&self) -> &str {
        &self.sample_text
    }

    pub fn similarity(&self) -> f64 {
        self.similarity
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_raw_texts() {
        let result = VerificationResult {
            similarity: 1.0,
            verdict: Verdict::Pass,
        };
        let record = VerificationRecord::new(
            PathBuf::from("/tmp/a.png"),
            "LOT 44B",
            "LOT44B!",
            result,
            Local::now(),
        );

        assert_eq!(record.reference_text(), "LOT 44B");
        assert_eq!(record.sample_text(), "LOT44B!");
        assert_eq!(record.similarity(), 1.0);
        assert_eq!(record.verdict(), Verdict::Pass);
        assert_eq!(record.image_path(), Path::new("/tmp/a.png"));
    }

    #[test]
    fn test_record_json_roundtrip() {
        let record = VerificationRecord::new(
            PathBuf::from("images/verify.png"),
            "ACME-100",
            "ACME-10O",
            VerificationResult {
                similarity: 0.875,
                verdict: Verdict::Fail,
            },
            Local::now(),
        );

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"verdict\":\"fail\""));

        let parsed: VerificationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
