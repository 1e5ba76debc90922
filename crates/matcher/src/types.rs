use fingerprint::{Fingerprint, FingerprintError, MatchMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of fingerprints per matching block.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Configuration for the bulk matching engine.
///
/// `MatchConfig` is cheap to clone and serde-friendly so it can be embedded in
/// higher-level configs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchConfig {
    /// Fingerprints per block. Each block is compared against itself and
    /// every later block as separate parallel tasks.
    #[serde(default = "MatchConfig::default_block_size")]
    pub block_size: usize,
    /// Mode used by callers that do not pick one per call.
    #[serde(default)]
    pub mode: MatchMode,
    /// Skip pairs whose provenances are both present and equal.
    #[serde(default = "MatchConfig::default_exclude_same_provenance")]
    pub exclude_same_provenance: bool,
}

impl MatchConfig {
    pub(crate) fn default_block_size() -> usize {
        DEFAULT_BLOCK_SIZE
    }

    pub(crate) fn default_exclude_same_provenance() -> bool {
        true
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_exclude_same_provenance(mut self, exclude: bool) -> Self {
        self.exclude_same_provenance = exclude;
        self
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.block_size == 0 {
            return Err(MatchError::InvalidConfig(
                "block_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            block_size: Self::default_block_size(),
            mode: MatchMode::default(),
            exclude_same_provenance: Self::default_exclude_same_provenance(),
        }
    }
}

/// Which input a matched fingerprint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// The only input of a self-match, or the first input of a cross match.
    Left,
    /// The second input of a cross match.
    Right,
}

/// Location of a fingerprint inside the matching input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub collection: Collection,
    /// Block index (`position / block_size`).
    pub block: usize,
    /// Index into the input slice.
    pub position: usize,
}

impl Origin {
    pub(crate) fn new(collection: Collection, position: usize, block_size: usize) -> Self {
        Self {
            collection,
            block: position / block_size,
            position,
        }
    }
}

/// How the two sides of a match were paired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchScope {
    /// Both sides in the same block.
    IntraBlock,
    /// Sides in different blocks of the same input.
    CrossBlock,
    /// Sides in different inputs.
    CrossCollection,
}

/// A pair of fingerprints judged to match under `mode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub left: Fingerprint,
    pub right: Fingerprint,
    pub left_origin: Origin,
    pub right_origin: Origin,
    /// Measured distance, at most the mode's threshold.
    pub distance: f64,
    pub mode: MatchMode,
    pub scope: MatchScope,
}

/// Counters for one bulk match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    /// Pairs whose distance was evaluated or attempted.
    pub compared: u64,
    pub matched: u64,
    /// Pairs skipped because the two shapes differ.
    pub incomparable: u64,
    /// Pairs skipped because both sides share a provenance.
    pub same_provenance: u64,
    /// Pairs skipped because the algorithm is not registered.
    pub unknown_algorithm: u64,
}

impl MatchStats {
    pub(crate) fn merge(&mut self, other: &MatchStats) {
        self.compared += other.compared;
        self.matched += other.matched;
        self.incomparable += other.incomparable;
        self.same_provenance += other.same_provenance;
        self.unknown_algorithm += other.unknown_algorithm;
    }

    /// Pairs skipped for any reason.
    pub fn skipped(&self) -> u64 {
        self.incomparable + self.same_provenance + self.unknown_algorithm
    }
}

/// Errors produced by the matching layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchError {
    /// Invalid configuration.
    #[error("invalid match config: {0}")]
    InvalidConfig(String),
    /// A pairwise comparison failed.
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
}
