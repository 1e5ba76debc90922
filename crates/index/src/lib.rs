//! # vpdedup Index
//!
//! A vantage-point tree over [`Fingerprint`]s. The tree only relies on the
//! metric contract (a symmetric, non-negative distance obeying the triangle
//! inequality), so it works the same for Hamming bit hashes and Euclidean
//! embeddings.
//!
//! ## Core Features
//!
//! - **Parallel construction**: large partitions are split on the rayon pool;
//!   small ones are built sequentially per task and grafted back.
//! - **Exact queries**: [`VpTree::k_nearest`], [`VpTree::nearest`] and the
//!   fixed-radius [`VpTree::within`] prune with the triangle inequality and
//!   never miss a member.
//! - **Incremental updates**: [`VpTree::insert`] attaches a leaf without
//!   rebalancing, [`VpTree::remove`] rebuilds only the affected subtree, and
//!   [`VpTree::append_unindexed`] parks members in a linear overflow until the
//!   next [`VpTree::rebuild`].
//!
//! All members of one tree share a single [`FingerprintShape`]; the first
//! member fixes it.
//!
//! ## Example Usage
//!
//! ```
//! use fingerprint::Fingerprint;
//! use index::{IndexConfig, VpTree};
//!
//! let items: Vec<Fingerprint> = (0u64..64)
//!     .map(|i| Fingerprint::from_words("dhash64", 64, &[i * 0x0101_0101]).unwrap())
//!     .collect();
//! let mut tree = VpTree::build(items.clone(), IndexConfig::default()).unwrap();
//!
//! let hits = tree.k_nearest(&items[3], 2).unwrap();
//! assert_eq!(hits[0].fingerprint, items[3]);
//! assert_eq!(hits[0].distance, 0.0);
//!
//! assert!(tree.remove(&items[3]).unwrap());
//! assert!(!tree.contains(&items[3]).unwrap());
//! assert_eq!(tree.len(), 63);
//! ```

mod node;
mod query;

pub use query::Neighbor;

use fingerprint::{Fingerprint, FingerprintError, FingerprintShape};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::node::{Arena, Node, Slot};

/// Partitions above this many members are split in parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 500;

/// Config for building and maintaining a [`VpTree`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Partition size above which construction fans out to the rayon pool.
    pub parallel_threshold: usize,
    /// When false, inserting a member equal to an existing one fails with
    /// [`IndexError::AlreadyPresent`].
    pub allow_duplicates: bool,
    /// Seed for vantage selection. `None` seeds from the global generator.
    pub seed: Option<u64>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            allow_duplicates: true,
            seed: None,
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.parallel_threshold == 0 {
            return Err(IndexError::InvalidArgument(
                "parallel_threshold must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Custom error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("an equal fingerprint is already indexed")]
    AlreadyPresent,
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
}

/// Vantage-point tree with an unindexed overflow list.
#[derive(Debug, Clone)]
pub struct VpTree {
    arena: Arena,
    extras: Vec<Fingerprint>,
    shape: Option<FingerprintShape>,
    config: IndexConfig,
}

impl Default for VpTree {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl VpTree {
    /// An empty tree. Its shape is fixed by the first member added.
    pub fn new(config: IndexConfig) -> Self {
        Self {
            arena: Arena::default(),
            extras: Vec::new(),
            shape: None,
            config,
        }
    }

    /// Build a balanced tree from a non-empty batch of comparable members.
    pub fn build(items: Vec<Fingerprint>, config: IndexConfig) -> Result<Self, IndexError> {
        config.validate()?;
        let shape = items.first().map(Fingerprint::shape);
        let count = items.len();
        let arena = node::build(items, &config)?;
        debug!(count, depth = arena.depth(), "built vantage-point tree");
        Ok(Self {
            arena,
            extras: Vec::new(),
            shape,
            config,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Shape shared by every member, `None` while the tree has never held one.
    pub fn shape(&self) -> Option<&FingerprintShape> {
        self.shape.as_ref()
    }

    /// Total members, indexed and extras.
    pub fn len(&self) -> usize {
        self.arena.live() + self.extras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Members waiting in the unindexed overflow.
    pub fn extras_len(&self) -> usize {
        self.extras.len()
    }

    /// Longest root-to-leaf path in nodes. Grows with unbalanced inserts;
    /// call [`VpTree::rebuild`] when it drifts far from `log2(len)`.
    pub fn depth(&self) -> usize {
        self.arena.depth()
    }

    /// Every member, indexed ones first, then extras.
    pub fn iter(&self) -> impl Iterator<Item = &Fingerprint> {
        self.arena
            .iter()
            .map(|node| &node.vantage)
            .chain(self.extras.iter())
    }

    pub fn contains(&self, x: &Fingerprint) -> Result<bool, IndexError> {
        self.check_shape(x)?;
        if self.extras.iter().any(|e| e == x) {
            return Ok(true);
        }

        let mut current = self.arena.root();
        while let Some(id) = current {
            let Some(node) = self.arena.get(id) else {
                break;
            };
            if node.vantage == *x {
                return Ok(true);
            }
            let d = x.distance(&node.vantage)?;
            current = node.child(node.side_for(d));
        }
        Ok(false)
    }

    /// Attach `x` as a new leaf at the first empty slot on its descent path.
    /// No rebalancing happens.
    pub fn insert(&mut self, x: Fingerprint) -> Result<(), IndexError> {
        self.check_shape(&x)?;
        if !self.config.allow_duplicates && self.contains(&x)? {
            return Err(IndexError::AlreadyPresent);
        }

        let mut slot = Slot::Root;
        let mut current = self.arena.root();
        while let Some(id) = current {
            let Some(node) = self.arena.get(id) else {
                break;
            };
            let side = node.side_for(x.distance(&node.vantage)?);
            slot = Slot::Child(id, side);
            current = node.child(side);
        }

        self.adopt_shape(&x);
        let leaf = self.arena.alloc(Node::leaf(x));
        self.arena.attach(slot, leaf);
        Ok(())
    }

    /// Park `x` in the unindexed overflow. Queries scan it linearly until the
    /// next [`VpTree::rebuild`].
    pub fn append_unindexed(&mut self, x: Fingerprint) -> Result<(), IndexError> {
        self.check_shape(&x)?;
        if !self.config.allow_duplicates && self.contains(&x)? {
            return Err(IndexError::AlreadyPresent);
        }
        self.adopt_shape(&x);
        self.extras.push(x);
        Ok(())
    }

    /// Remove one member equal to `x`. The subtree that held it is rebuilt
    /// from its remaining members and reattached at the same slot.
    pub fn remove(&mut self, x: &Fingerprint) -> Result<bool, IndexError> {
        self.check_shape(x)?;

        let mut slot = Slot::Root;
        let mut current = self.arena.root();
        let mut found = None;
        while let Some(id) = current {
            let Some(node) = self.arena.get(id) else {
                break;
            };
            if node.vantage == *x {
                found = Some(slot);
                break;
            }
            let side = node.side_for(x.distance(&node.vantage)?);
            slot = Slot::Child(id, side);
            current = node.child(side);
        }

        if let Some(slot) = found {
            if let Some(id) = self.arena.detach(slot) {
                let mut members = self.arena.take_subtree(id);
                // The subtree root's vantage comes first and is the one removed.
                members.remove(0);
                let rebuilt = members.len();
                if !members.is_empty() {
                    let subtree = node::build(members, &self.config)?;
                    if let Some(root) = self.arena.graft(subtree) {
                        self.arena.attach(slot, root);
                    }
                }
                debug!(rebuilt, "removed member and rebuilt its subtree");
                return Ok(true);
            }
        }

        match self.extras.iter().position(|e| e == x) {
            Some(pos) => {
                self.extras.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Rebuild a balanced tree from every member, folding extras into the
    /// index.
    pub fn rebuild(&mut self) -> Result<(), IndexError> {
        let members: Vec<Fingerprint> = self.iter().cloned().collect();
        if members.is_empty() {
            self.arena = Arena::default();
            return Ok(());
        }
        let arena = node::build(members, &self.config)?;
        debug!(
            count = arena.live(),
            folded = self.extras.len(),
            depth = arena.depth(),
            "rebuilt vantage-point tree"
        );
        self.arena = arena;
        self.extras.clear();
        Ok(())
    }

    pub(crate) fn check_shape(&self, x: &Fingerprint) -> Result<(), IndexError> {
        match &self.shape {
            Some(shape) if !x.has_shape(shape) => Err(FingerprintError::Comparability {
                left: x.shape(),
                right: shape.clone(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    fn adopt_shape(&mut self, x: &Fingerprint) {
        if self.shape.is_none() {
            self.shape = Some(x.shape());
        }
    }
}

impl<'a> IntoIterator for &'a VpTree {
    type Item = &'a Fingerprint;
    type IntoIter = Box<dyn Iterator<Item = &'a Fingerprint> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
