use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FingerprintError;

/// Match sensitivity, from most to least strict.
///
/// A mode is not a distance. Each registered algorithm maps every mode to its
/// own threshold (see [`crate::MatchThresholds`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Bit-identical or numerically identical payloads only.
    Exact,
    Strict,
    #[default]
    Normal,
    Sloppy,
}

impl MatchMode {
    pub const ALL: [MatchMode; 4] = [
        MatchMode::Exact,
        MatchMode::Strict,
        MatchMode::Normal,
        MatchMode::Sloppy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Exact => "EXACT",
            MatchMode::Strict => "STRICT",
            MatchMode::Normal => "NORMAL",
            MatchMode::Sloppy => "SLOPPY",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatchMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FingerprintError::parse(format!("unknown match mode `{s}`")))
    }
}
