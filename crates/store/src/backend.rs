use std::path::PathBuf;
use std::sync::RwLock;

use fingerprint::{Fingerprint, FingerprintError, FingerprintShape};
use index::{IndexConfig, IndexError, Neighbor};
use matcher::MatchEngine;

use crate::{HashStore, StoreError};

pub mod linear;
pub mod tree;

use linear::{LinearStore, LinearStoreConfig};
use tree::TreeStore;

/// Configuration for selecting and building a store backend.
///
/// # Example
/// ```
/// use store::BackendConfig;
///
/// // Brute-force, in memory (for tests and small sets)
/// let config = BackendConfig::list();
///
/// // Append-only log on disk
/// let config = BackendConfig::linear("/data/hashes.log");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum BackendConfig {
    /// In-memory list, brute-force queries.
    List,
    /// Append-only log file, streamed on every query.
    Linear(LinearStoreConfig),
    /// In-memory vantage-point tree.
    Tree(IndexConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Tree(IndexConfig::default())
    }
}

impl BackendConfig {
    pub fn list() -> Self {
        BackendConfig::List
    }

    /// Log-backed store at `path` with default options.
    pub fn linear<P: Into<PathBuf>>(path: P) -> Self {
        BackendConfig::Linear(LinearStoreConfig::new(path))
    }

    pub fn tree() -> Self {
        BackendConfig::default()
    }

    pub fn tree_with(config: IndexConfig) -> Self {
        BackendConfig::Tree(config)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::List => ListStore::NAME,
            BackendConfig::Linear(_) => LinearStore::NAME,
            BackendConfig::Tree(_) => TreeStore::NAME,
        }
    }

    /// Build the backend. `engine` supplies the algorithm registry and the
    /// matcher used by [`HashStore::find_matches`].
    pub fn build(&self, engine: MatchEngine) -> Result<Box<dyn HashStore>, StoreError> {
        match self {
            BackendConfig::List => Ok(Box::new(ListStore::new(engine))),
            BackendConfig::Linear(config) => Ok(Box::new(LinearStore::open(config.clone(), engine)?)),
            BackendConfig::Tree(config) => Ok(Box::new(TreeStore::new(engine, config.clone())?)),
        }
    }
}

pub(crate) fn check_k(k: usize) -> Result<(), StoreError> {
    if k == 0 {
        return Err(IndexError::InvalidArgument("k must be greater than zero".into()).into());
    }
    Ok(())
}

pub(crate) fn check_radius(radius: f64) -> Result<(), StoreError> {
    if radius.is_nan() || radius < 0.0 {
        return Err(IndexError::InvalidArgument(format!("search radius must be >= 0, got {radius}")).into());
    }
    Ok(())
}

/// Reject `fp` unless it has `shape`. An unset shape accepts anything.
pub(crate) fn check_shape(shape: Option<&FingerprintShape>, fp: &Fingerprint) -> Result<(), StoreError> {
    match shape {
        Some(shape) if !fp.has_shape(shape) => Err(FingerprintError::Comparability {
            left: fp.shape(),
            right: shape.clone(),
        }
        .into()),
        _ => Ok(()),
    }
}

/// Sort by distance (ascending, stable) and keep the first `k`.
pub(crate) fn top_k(mut neighbors: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    neighbors.truncate(k);
    neighbors
}

/// Fingerprints compared one by one against the query.
pub(crate) fn scan_within<'a>(
    query: &Fingerprint,
    radius: f64,
    items: impl IntoIterator<Item = &'a Fingerprint>,
) -> Result<Vec<Neighbor>, StoreError> {
    let mut found = Vec::new();
    for item in items {
        let distance = query.distance(item)?;
        if distance <= radius {
            found.push(Neighbor {
                fingerprint: item.clone(),
                distance,
            });
        }
    }
    found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(found)
}

struct ListState {
    items: Vec<Fingerprint>,
    shape: Option<FingerprintShape>,
}

/// An in-memory backend using a `RwLock` around a `Vec`. Queries are brute
/// force.
pub struct ListStore {
    engine: MatchEngine,
    state: RwLock<ListState>,
}

impl ListStore {
    pub const NAME: &'static str = "list";

    pub fn new(engine: MatchEngine) -> Self {
        Self {
            engine,
            state: RwLock::new(ListState {
                items: Vec::new(),
                shape: None,
            }),
        }
    }
}

impl HashStore for ListStore {
    fn backend_name(&self) -> &'static str {
        Self::NAME
    }

    fn matcher(&self) -> &MatchEngine {
        &self.engine
    }

    fn store(&self, fp: Fingerprint) -> Result<(), StoreError> {
        self.store_all(vec![fp])
    }

    fn store_all(&self, fps: Vec<Fingerprint>) -> Result<(), StoreError> {
        for fp in &fps {
            self.engine.registry().validate(fp)?;
        }
        // A single write lock is held for the entire batch.
        let mut state = self.state.write()?;
        let mut shape = state.shape.clone();
        for fp in &fps {
            check_shape(shape.as_ref(), fp)?;
            shape.get_or_insert_with(|| fp.shape());
        }
        state.shape = shape;
        state.items.extend(fps);
        Ok(())
    }

    fn k_nearest(&self, fp: &Fingerprint, k: usize) -> Result<Vec<Neighbor>, StoreError> {
        check_k(k)?;
        let state = self.state.read()?;
        check_shape(state.shape.as_ref(), fp)?;
        let neighbors = state
            .items
            .iter()
            .map(|item| {
                Ok(Neighbor {
                    fingerprint: item.clone(),
                    distance: fp.distance(item)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(top_k(neighbors, k))
    }

    fn all_within(&self, fp: &Fingerprint, distance: f64) -> Result<Vec<Neighbor>, StoreError> {
        check_radius(distance)?;
        let state = self.state.read()?;
        check_shape(state.shape.as_ref(), fp)?;
        scan_within(fp, distance, &state.items)
    }

    fn to_list(&self) -> Result<Vec<Fingerprint>, StoreError> {
        Ok(self.state.read()?.items.clone())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.state.read()?.items.len())
    }
}
