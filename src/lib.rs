//! Workspace umbrella crate for vpdedup.
//!
//! This crate stitches together the fingerprint contract, the VP-tree index,
//! the hash stores and the bulk matcher so callers can go from a YAML file to
//! a working store with a single entry point.
//!
//! ```
//! use vpdedup::{Fingerprint, MatchMode, VpdedupConfig, open_store};
//!
//! let config = VpdedupConfig::from_yaml("version: \"1.0\"\nstore:\n  backend: list\n").unwrap();
//! let store = open_store(&config).unwrap();
//! for (path, word) in [("a.jpg", 0u64), ("b.jpg", 0b1), ("c.jpg", u64::MAX)] {
//!     let fp = Fingerprint::from_words("phash64", 64, &[word]).unwrap();
//!     store.store(fp.with_provenance(path)).unwrap();
//! }
//! assert_eq!(store.find_matches(MatchMode::Exact).unwrap().len(), 0);
//! assert_eq!(store.find_matches(MatchMode::Strict).unwrap().len(), 1);
//! ```

pub mod config;

pub use config::{ConfigLoadError, VpdedupConfig};
pub use fingerprint::{
    AlgorithmRegistry, AlgorithmSpec, Fingerprint, FingerprintError, FingerprintShape,
    MatchMode, MatchThresholds, MetricKind, RegistryBuilder,
};
pub use index::{IndexConfig, IndexError, Neighbor, VpTree};
pub use matcher::{
    Collection, MatchConfig, MatchEngine, MatchError, MatchMetrics, MatchRecord, MatchScope,
    MatchStats, Origin, group_matches, set_match_metrics,
};
pub use store::{
    BackendConfig, HashStore, LinearStore, LinearStoreConfig, ListStore, StoreError, TreeStore,
};

use std::io::BufRead;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Errors surfaced by the umbrella API.
#[derive(Debug, Error)]
pub enum VpdedupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigLoadError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("match error: {0}")]
    Match(#[from] MatchError),
    #[error("fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),
    #[error("logging already initialized: {0}")]
    Logging(String),
}

/// Build the configured store backend, wired to the configured matcher and
/// algorithm registry.
pub fn open_store(config: &VpdedupConfig) -> Result<Box<dyn HashStore>, VpdedupError> {
    let engine = config.match_engine()?;
    let backend = config.backend_config()?;
    let store = backend.build(engine)?;
    info!(
        backend = store.backend_name(),
        members = store.len()?,
        "opened hash store"
    );
    Ok(store)
}

/// Install the global tracing subscriber described by `config.logging`.
///
/// `RUST_LOG`, when set, overrides the configured filter. Fails if a
/// subscriber is already installed.
pub fn init_logging(config: &VpdedupConfig) -> Result<(), VpdedupError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .map_err(|err| VpdedupError::Logging(err.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    let result = if config.logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|err| VpdedupError::Logging(err.to_string()))
}

/// Parse serialized fingerprint lines (the log store format) against
/// `registry`. Blank lines are skipped; the first malformed line fails the
/// whole batch with its 1-based line number.
pub fn parse_lines<R: BufRead>(
    registry: &AlgorithmRegistry,
    reader: R,
) -> Result<Vec<Fingerprint>, VpdedupError> {
    let lines = reader
        .lines()
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)?;

    let parsed: Vec<Option<Fingerprint>> = lines
        .par_iter()
        .enumerate()
        .map(|(index, line)| {
            if line.trim().is_empty() {
                return Ok(None);
            }
            registry.parse(line).map(Some).map_err(|err| StoreError::Corrupt {
                line: index + 1,
                reason: err.to_string(),
            })
        })
        .collect::<Result<_, StoreError>>()?;

    let fingerprints: Vec<_> = parsed.into_iter().flatten().collect();
    debug!(lines = lines.len(), parsed = fingerprints.len(), "parsed fingerprint lines");
    Ok(fingerprints)
}

/// Parse `reader` with the store's registry and add every fingerprint in one
/// batch. Returns the number stored.
pub fn import_lines<R: BufRead>(store: &dyn HashStore, reader: R) -> Result<usize, VpdedupError> {
    let fingerprints = parse_lines(store.matcher().registry(), reader)?;
    let count = fingerprints.len();
    store.store_all(fingerprints)?;
    info!(backend = store.backend_name(), count, "imported fingerprints");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn line(word: u64, path: &str) -> String {
        Fingerprint::from_words("dhash64", 64, &[word])
            .unwrap()
            .with_provenance(path)
            .to_line()
    }

    #[test]
    fn parse_lines_skips_blanks() {
        let text = format!("{}\n\n{}\n", line(1, "a.jpg"), line(2, "b.jpg"));
        let parsed = parse_lines(&AlgorithmRegistry::with_defaults(), Cursor::new(text)).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].provenance(), Some("b.jpg"));
    }

    #[test]
    fn parse_lines_reports_line_number() {
        let text = format!("{}\nnonsense\n", line(1, "a.jpg"));
        let err = parse_lines(&AlgorithmRegistry::with_defaults(), Cursor::new(text)).unwrap_err();
        assert!(matches!(
            err,
            VpdedupError::Store(StoreError::Corrupt { line: 2, .. })
        ));
    }

    #[test]
    fn import_into_configured_store() {
        let store = open_store(&VpdedupConfig::default()).unwrap();
        assert_eq!(store.backend_name(), "tree");
        let text = (0..20u64)
            .map(|i| line(i << 8, &format!("{i}.jpg")))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(import_lines(store.as_ref(), Cursor::new(text)).unwrap(), 20);
        assert_eq!(store.len().unwrap(), 20);
    }
}
