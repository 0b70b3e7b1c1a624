//! Terminal output for detections, verifications and history

use crate::pipeline::{Verification, VerificationError};
use crate::verification::{diff, normalize, render_inline, VerificationRecord};
use crate::vision::Detection;

pub fn print_detections(detections: &[Detection]) {
    if detections.is_empty() {
        println!("No text detected.");
        return;
    }

    println!("{:>3}  {:<32} {:>6}  bounds", "#", "text", "conf");
    for (idx, detection) in detections.iter().enumerate() {
        let (x, y, w, h) = detection.bounds();
        println!(
            "{:>3}  {:<32} {:>6.2}  {}x{} at ({}, {})",
            idx,
            format!("{:?}", detection.text),
            detection.confidence,
            w,
            h,
            x,
            y
        );
    }
}

pub fn print_verification(verification: &Verification) {
    let record = &verification.record;

    println!("Result:     {}", verification.result.verdict);
    println!("Similarity: {:.3}", verification.result.similarity);
    println!(
        "Reference:  {:?} -> {:?}",
        record.reference_text(),
        normalize(record.reference_text())
    );
    println!(
        "Sample:     {:?} -> {:?}",
        record.sample_text(),
        normalize(record.sample_text())
    );
    if !verification.result.verdict.is_pass() {
        println!("Diff:       {}", diff_line(record));
    }
}

pub fn print_history(records: &[VerificationRecord], with_diff: bool) {
    if records.is_empty() {
        println!("No verifications recorded.");
        return;
    }

    for record in records {
        println!(
            "{}  {}  {:.3}  {:?} / {:?}  {}",
            record.timestamp().format("%Y-%m-%d %H:%M:%S"),
            record.verdict(),
            record.similarity(),
            record.reference_text(),
            record.sample_text(),
            record.image_path().display()
        );
        if with_diff && !record.verdict().is_pass() {
            println!("    {}", diff_line(record));
        }
    }
}

/// Print an error with its operator-facing explanation
pub fn print_error(err: &VerificationError) {
    eprintln!("Error: {err}");
    eprintln!("{}", err.category());
}

/// Raw reference against raw sample, differences marked inline
pub fn diff_line(record: &VerificationRecord) -> String {
    render_inline(&diff(record.reference_text(), record.sample_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::{Verdict, VerificationResult};
    use chrono::Local;
    use std::path::PathBuf;

    #[test]
    fn test_diff_line_marks_changed_characters() {
        let record = VerificationRecord::new(
            PathBuf::from("x.png"),
            "LOT 44B",
            "LOT 48B",
            VerificationResult {
                similarity: 0.8,
                verdict: Verdict::Fail,
            },
            Local::now(),
        );
        assert_eq!(diff_line(&record), "LOT 4[-4-]{+8+}B");
    }
}
