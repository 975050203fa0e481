//! External learning/community platforms that feed enrollment data.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A platform a student can be enrolled on.
///
/// Wire format: lowercase name (`"hotmart"`, `"curseduca"`, `"discord"`).
/// Adding a platform means adding a variant here and one mapping row in the
/// enrollments service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Hotmart,
    CursEduca,
    Discord,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Hotmart, Platform::CursEduca, Platform::Discord];

    /// Wire name, also the key of the platform sub-object in legacy user documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hotmart => "hotmart",
            Self::CursEduca => "curseduca",
            Self::Discord => "discord",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hotmart" => Ok(Self::Hotmart),
            "curseduca" => Ok(Self::CursEduca),
            "discord" => Ok(Self::Discord),
            _ => Err(UnknownPlatform(s.to_owned())),
        }
    }
}
