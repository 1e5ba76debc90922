use std::collections::HashSet;
use std::sync::RwLock;

use fingerprint::Fingerprint;
use index::{IndexConfig, IndexError, Neighbor, VpTree};
use matcher::MatchEngine;
use tracing::debug;

use crate::{HashStore, StoreError};

/// Store backed by an in-memory vantage-point tree.
///
/// Inserts attach leaves without rebalancing; call [`TreeStore::rebuild`]
/// after heavy insert traffic, using [`TreeStore::depth`] as the signal.
pub struct TreeStore {
    engine: MatchEngine,
    tree: RwLock<VpTree>,
}

impl TreeStore {
    pub const NAME: &'static str = "tree";

    pub fn new(engine: MatchEngine, config: IndexConfig) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self {
            engine,
            tree: RwLock::new(VpTree::new(config)),
        })
    }

    /// Store holding a balanced tree built from `items`.
    pub fn from_fingerprints(
        engine: MatchEngine,
        config: IndexConfig,
        items: Vec<Fingerprint>,
    ) -> Result<Self, StoreError> {
        let store = Self::new(engine, config)?;
        store.store_all(items)?;
        Ok(store)
    }

    pub fn contains(&self, fp: &Fingerprint) -> Result<bool, StoreError> {
        Ok(self.tree.read()?.contains(fp)?)
    }

    /// Remove one fingerprint equal to `fp`. Returns whether one was found.
    pub fn remove(&self, fp: &Fingerprint) -> Result<bool, StoreError> {
        Ok(self.tree.write()?.remove(fp)?)
    }

    /// Rebuild a balanced tree from the current contents.
    pub fn rebuild(&self) -> Result<(), StoreError> {
        Ok(self.tree.write()?.rebuild()?)
    }

    pub fn depth(&self) -> Result<usize, StoreError> {
        Ok(self.tree.read()?.depth())
    }
}

impl HashStore for TreeStore {
    fn backend_name(&self) -> &'static str {
        Self::NAME
    }

    fn matcher(&self) -> &MatchEngine {
        &self.engine
    }

    fn store(&self, fp: Fingerprint) -> Result<(), StoreError> {
        self.engine.registry().validate(&fp)?;
        let mut tree = self.tree.write()?;
        match tree.insert(fp) {
            Err(IndexError::AlreadyPresent) => {
                debug!("fingerprint already indexed, skipping duplicate");
                Ok(())
            }
            other => Ok(other?),
        }
    }

    /// An empty tree is bulk-built from the batch so it starts balanced,
    /// after dropping repeats when duplicates are disallowed. Otherwise each
    /// member is inserted in turn.
    fn store_all(&self, fps: Vec<Fingerprint>) -> Result<(), StoreError> {
        if fps.is_empty() {
            return Ok(());
        }
        for fp in &fps {
            self.engine.registry().validate(fp)?;
        }

        let mut tree = self.tree.write()?;
        if tree.is_empty() {
            let fps = if tree.config().allow_duplicates {
                fps
            } else {
                let total = fps.len();
                let mut seen = HashSet::with_capacity(total);
                let unique: Vec<_> = fps.into_iter().filter(|fp| seen.insert(fp.clone())).collect();
                if unique.len() < total {
                    debug!(skipped = total - unique.len(), "dropped duplicate fingerprints from batch");
                }
                unique
            };
            let rebuilt = VpTree::build(fps, tree.config().clone())?;
            if let (Some(old), Some(new)) = (tree.shape(), rebuilt.shape()) {
                if old != new {
                    return Err(fingerprint::FingerprintError::Comparability {
                        left: new.clone(),
                        right: old.clone(),
                    }
                    .into());
                }
            }
            *tree = rebuilt;
            return Ok(());
        }

        for fp in fps {
            match tree.insert(fp) {
                Err(IndexError::AlreadyPresent) => {
                    debug!("fingerprint already indexed, skipping duplicate");
                }
                other => other?,
            }
        }
        Ok(())
    }

    fn k_nearest(&self, fp: &Fingerprint, k: usize) -> Result<Vec<Neighbor>, StoreError> {
        Ok(self.tree.read()?.k_nearest(fp, k)?)
    }

    fn all_within(&self, fp: &Fingerprint, distance: f64) -> Result<Vec<Neighbor>, StoreError> {
        Ok(self.tree.read()?.within(fp, distance)?)
    }

    fn to_list(&self) -> Result<Vec<Fingerprint>, StoreError> {
        Ok(self.tree.read()?.iter().cloned().collect())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.tree.read()?.len())
    }
}
