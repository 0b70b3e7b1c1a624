//! Verification Layer
//!
//! Normalizes and compares the reference and sample texts picked from OCR
//! detections, and defines the record that is committed to history.

pub mod compare;
pub mod diff;
pub mod normalize;
pub mod record;
pub mod roles;

pub use compare::{Comparator, Verdict, VerificationResult};
pub use diff::{diff, render_inline, DiffSegment, DiffTag};
pub use normalize::normalize;
pub use record::VerificationRecord;
pub use roles::{Role, RoleAssignment, SelectionError};
