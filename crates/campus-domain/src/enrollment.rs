//! Enrollment status and provenance.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a user's enrollment on a platform.
///
/// Wire format: `"ACTIVE"` / `"INACTIVE"`. Any other stored value is kept
/// verbatim in `Other` so normalized rows round-trip without recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnrollmentStatus {
    Active,
    Inactive,
    Other(String),
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Other(s) => s,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl From<String> for EnrollmentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ACTIVE" => Self::Active,
            "INACTIVE" => Self::Inactive,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for EnrollmentStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<EnrollmentStatus> for String {
    fn from(status: EnrollmentStatus) -> Self {
        match status {
            EnrollmentStatus::Other(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which data shape an enrollment was unified from.
///
/// A logical enrollment is only ever emitted from one of the two shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentOrigin {
    /// Nested per-platform sub-object on the legacy user document (V1).
    Legacy,
    /// Row of the normalized user-product collection (V2).
    Normalized,
}

impl EnrollmentOrigin {
    /// Prefix used in synthesized enrollment ids.
    pub fn source_tag(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Normalized => "normalized",
        }
    }
}
