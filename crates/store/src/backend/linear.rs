//! Append-only log backend.
//!
//! One serialized fingerprint per line, UTF-8, no header:
//!
//! ```text
//! efcdab8967452301,dhash64,64,hamming,/photos/a.jpg
//! ```
//!
//! Lines are only ever appended. Validity is checked lazily whenever the log
//! is scanned; blank lines are ignored. In strict mode a malformed line fails
//! the scan with [`StoreError::Corrupt`], otherwise it is skipped with a
//! warning. Records whose shape differs from the store's are treated the
//! same way. This is not a database: there are no transactions and a crash
//! mid-append can leave a truncated last line, which the next open terminates
//! so that later appends are not glued onto it.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use fingerprint::{Fingerprint, FingerprintShape};
use index::Neighbor;
use matcher::MatchEngine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{check_k, check_radius, check_shape, top_k};
use crate::{HashStore, StoreError};

/// Options for [`LinearStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearStoreConfig {
    /// Log file; created when missing.
    pub path: PathBuf,
    /// `fsync` after every append batch.
    #[serde(default)]
    pub sync_on_write: bool,
    /// Fail scans on malformed lines instead of skipping them.
    #[serde(default)]
    pub strict: bool,
}

impl LinearStoreConfig {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            sync_on_write: false,
            strict: false,
        }
    }

    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.path.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig(
                "linear store requires a non-empty path".into(),
            ));
        }
        Ok(())
    }
}

struct LogState {
    writer: BufWriter<File>,
    len: usize,
    shape: Option<FingerprintShape>,
}

/// Log-backed store. Writes append under the write lock; every query
/// re-reads the file under the read lock.
pub struct LinearStore {
    config: LinearStoreConfig,
    engine: MatchEngine,
    state: RwLock<LogState>,
}

impl LinearStore {
    pub const NAME: &'static str = "linear";

    /// Open or create the log at `config.path`. Existing contents are scanned
    /// once to learn the member count and shape.
    pub fn open(config: LinearStoreConfig, engine: MatchEngine) -> Result<Self, StoreError> {
        config.validate()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;
        let mut writer = BufWriter::new(file);
        if ends_mid_line(&config.path)? {
            // Terminate a truncated last record so appends start on a fresh line.
            writer.write_all(b"\n")?;
            writer.flush()?;
            warn!(path = %config.path.display(), "log ended mid-line; terminated the partial record");
        }

        let mut store = Self {
            config,
            engine,
            state: RwLock::new(LogState {
                writer,
                len: 0,
                shape: None,
            }),
        };

        let mut len = 0;
        let shape = store.scan(None, |_| {
            len += 1;
            Ok(())
        })?;
        let state = store.state.get_mut()?;
        state.len = len;
        state.shape = shape;
        debug!(path = %store.config.path.display(), len, "opened linear store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &LinearStoreConfig {
        &self.config
    }

    /// Stream every valid record of the log into `visit` and return the
    /// shape the records share.
    ///
    /// A record is valid when it parses, its algorithm is registered and it
    /// has `shape` (or, with no shape yet, the shape of the first valid
    /// record). Callers hold the read lock (or own the store exclusively), so
    /// no append can interleave with the scan.
    fn scan<F>(
        &self,
        shape: Option<&FingerprintShape>,
        mut visit: F,
    ) -> Result<Option<FingerprintShape>, StoreError>
    where
        F: FnMut(Fingerprint) -> Result<(), StoreError>,
    {
        let mut shape = shape.cloned();
        let reader = BufReader::new(File::open(&self.config.path)?);
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = self
                .engine
                .registry()
                .parse(&line)
                .map_err(|err| err.to_string())
                .and_then(|fp| match &shape {
                    Some(expected) if !fp.has_shape(expected) => Err(format!(
                        "shape {} does not match store shape {expected}",
                        fp.shape()
                    )),
                    _ => Ok(fp),
                });
            match record {
                Ok(fp) => {
                    shape.get_or_insert_with(|| fp.shape());
                    visit(fp)?;
                }
                Err(reason) if self.config.strict => {
                    return Err(StoreError::Corrupt {
                        line: index + 1,
                        reason,
                    });
                }
                Err(reason) => {
                    warn!(
                        path = %self.config.path.display(),
                        line = index + 1,
                        error = %reason,
                        "skipping malformed fingerprint line"
                    );
                }
            }
        }
        Ok(shape)
    }
}

/// Whether the file at `path` is non-empty and lacks a final newline.
fn ends_mid_line(path: &Path) -> Result<bool, StoreError> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl HashStore for LinearStore {
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
        let mut state = self.state.write()?;
        let mut shape = state.shape.clone();
        for fp in &fps {
            check_shape(shape.as_ref(), fp)?;
            shape.get_or_insert_with(|| fp.shape());
        }

        for fp in &fps {
            writeln!(state.writer, "{}", fp.to_line())?;
        }
        state.writer.flush()?;
        if self.config.sync_on_write {
            state.writer.get_ref().sync_data()?;
        }
        state.shape = shape;
        state.len += fps.len();
        Ok(())
    }

    fn k_nearest(&self, fp: &Fingerprint, k: usize) -> Result<Vec<Neighbor>, StoreError> {
        check_k(k)?;
        let state = self.state.read()?;
        check_shape(state.shape.as_ref(), fp)?;

        let mut neighbors = Vec::with_capacity(state.len);
        self.scan(state.shape.as_ref(), |item| {
            let distance = fp.distance(&item)?;
            neighbors.push(Neighbor {
                fingerprint: item,
                distance,
            });
            Ok(())
        })?;
        Ok(top_k(neighbors, k))
    }

    fn all_within(&self, fp: &Fingerprint, distance: f64) -> Result<Vec<Neighbor>, StoreError> {
        check_radius(distance)?;
        let state = self.state.read()?;
        check_shape(state.shape.as_ref(), fp)?;

        let mut found = Vec::new();
        self.scan(state.shape.as_ref(), |item| {
            let d = fp.distance(&item)?;
            if d <= distance {
                found.push(Neighbor {
                    fingerprint: item,
                    distance: d,
                });
            }
            Ok(())
        })?;
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(found)
    }

    fn to_list(&self) -> Result<Vec<Fingerprint>, StoreError> {
        let state = self.state.read()?;
        let mut items = Vec::with_capacity(state.len);
        self.scan(state.shape.as_ref(), |fp| {
            items.push(fp);
            Ok(())
        })?;
        Ok(items)
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.state.read()?.len)
    }
}
