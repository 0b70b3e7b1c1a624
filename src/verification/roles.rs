//! Role assignment of detections for a verification attempt

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which side of the comparison a detection stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The printed "sign" label
    Reference,
    /// The stamped or printed code being checked
    Sample,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Reference => f.write_str("reference"),
            Role::Sample => f.write_str("sample"),
        }
    }
}

/// Errors from assigning roles to detections
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("detection index {index} is out of range ({len} detections)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no detection selected as {0}")]
    MissingRole(Role),
}

/// Current holder of each role, by detection index.
///
/// Each role has at most one holder. Assigning a role moves it; it never
/// accumulates. One detection may hold both roles, which compares a region
/// against itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    reference: Option<usize>,
    sample: Option<usize>,
}

impl RoleAssignment {
    /// Assignment with both roles empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a complete assignment in one step
    pub fn pair(reference: usize, sample: usize, len: usize) -> Result<Self, SelectionError> {
        Self::new()
            .assign(reference, Role::Reference, len)?
            .assign(sample, Role::Sample, len)
    }

    /// Give `role` to the detection at `index`, replacing any prior holder.
    ///
    /// `len` is the number of detections the index refers into.
    pub fn assign(self, index: usize, role: Role, len: usize) -> Result<Self, SelectionError> {
        if index >= len {
            return Err(SelectionError::IndexOutOfRange { index, len });
        }

        let mut next = self;
        match role {
            Role::Reference => next.reference = Some(index),
            Role::Sample => next.sample = Some(index),
        }
        Ok(next)
    }

    /// Role shown for a detection. A detection holding both roles is shown
    /// as the reference.
    pub fn role_of(&self, index: usize) -> Option<Role> {
        if self.reference == Some(index) {
            Some(Role::Reference)
        } else if self.sample == Some(index) {
            Some(Role::Sample)
        } else {
            None
        }
    }

    /// Both indices, or the first missing role
    pub fn complete(&self) -> Result<(usize, usize), SelectionError> {
        let reference = self.reference.ok_or(SelectionError::MissingRole(Role::Reference))?;
        let sample = self.sample.ok_or(SelectionError::MissingRole(Role::Sample))?;
        Ok((reference, sample))
    }
}
