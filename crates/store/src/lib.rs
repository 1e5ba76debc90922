//! # vpdedup Store
//!
//! Hash stores keep fingerprints produced by external hashing algorithms and
//! answer proximity queries over them. Every backend implements the same
//! [`HashStore`] trait, so callers pick a storage strategy through
//! [`BackendConfig`] without touching query code.
//!
//! ## Backends
//!
//! - [`ListStore`]: an in-memory `Vec` queried by brute force. Slow but
//!   trivially correct; it is the oracle the other backends are tested
//!   against.
//! - [`LinearStore`]: an append-only log with one serialized fingerprint per
//!   line. Every query streams the whole file, so contents survive restarts
//!   at the cost of O(n) reads.
//! - [`TreeStore`]: a [`index::VpTree`] kept in memory. Inserts index
//!   immediately and queries prune with the triangle inequality.
//!
//! Every store validates incoming fingerprints against the
//! [`fingerprint::AlgorithmRegistry`] of its [`MatchEngine`], and holds a
//! single [`fingerprint::FingerprintShape`] fixed by the first member.
//!
//! ## Concurrency
//!
//! Each store guards its state with one `std::sync::RwLock`: queries share the
//! read side, mutations take the write side. A poisoned lock surfaces as
//! [`StoreError::Poisoned`].
//!
//! ## Example Usage
//!
//! ```
//! use fingerprint::{Fingerprint, MatchMode};
//! use matcher::MatchEngine;
//! use store::{BackendConfig, HashStore};
//!
//! let store = BackendConfig::tree().build(MatchEngine::with_defaults()).unwrap();
//! for (path, word) in [("a.jpg", 0u64), ("b.jpg", 1), ("c.jpg", 0xFFFF_0000)] {
//!     let fp = Fingerprint::from_words("dhash64", 64, &[word]).unwrap();
//!     store.store(fp.with_provenance(path)).unwrap();
//! }
//!
//! let query = Fingerprint::from_words("dhash64", 64, &[3]).unwrap();
//! let nearest = store.nearest_neighbor(&query).unwrap().unwrap();
//! assert_eq!(nearest.provenance(), Some("b.jpg"));
//!
//! let matches = store.find_matches(MatchMode::Strict).unwrap();
//! assert_eq!(matches.len(), 1);
//! ```

mod backend;

pub use backend::linear::{LinearStore, LinearStoreConfig};
pub use backend::tree::TreeStore;
pub use backend::{BackendConfig, ListStore};
pub use index::Neighbor;

use fingerprint::{Fingerprint, FingerprintError, MatchMode};
use index::IndexError;
use matcher::{MatchEngine, MatchError, MatchRecord};
use thiserror::Error;

/// Uniform query API over every storage backend.
pub trait HashStore: Send + Sync {
    /// Short backend identifier, e.g. `"tree"`.
    fn backend_name(&self) -> &'static str;

    /// Engine used by [`HashStore::find_matches`]; its registry validates
    /// stored fingerprints.
    fn matcher(&self) -> &MatchEngine;

    /// Add one fingerprint.
    fn store(&self, fp: Fingerprint) -> Result<(), StoreError>;

    /// Add many fingerprints. Backends override this to take their lock once.
    fn store_all(&self, fps: Vec<Fingerprint>) -> Result<(), StoreError> {
        for fp in fps {
            self.store(fp)?;
        }
        Ok(())
    }

    /// The `k` stored fingerprints closest to `fp`, ascending by distance.
    fn k_nearest(&self, fp: &Fingerprint, k: usize) -> Result<Vec<Neighbor>, StoreError>;

    /// The closest stored fingerprint, if any.
    fn nearest_neighbor(&self, fp: &Fingerprint) -> Result<Option<Fingerprint>, StoreError> {
        Ok(self
            .k_nearest(fp, 1)?
            .into_iter()
            .next()
            .map(|n| n.fingerprint))
    }

    /// Every stored fingerprint at distance `<= distance` from `fp`,
    /// ascending.
    fn all_within(&self, fp: &Fingerprint, distance: f64) -> Result<Vec<Neighbor>, StoreError>;

    /// Snapshot of every stored fingerprint.
    fn to_list(&self) -> Result<Vec<Fingerprint>, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Run the bulk matcher over the store's full contents.
    fn find_matches(&self, mode: MatchMode) -> Result<Vec<MatchRecord>, StoreError> {
        let items = self.to_list()?;
        Ok(self.matcher().find_matches(&items, mode))
    }
}

/// Errors raised by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record on line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
    #[error("store lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("invalid store config: {0}")]
    InvalidConfig(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}
