use std::sync::{Arc, Mutex};
use std::time::Instant;

use fingerprint::{AlgorithmRegistry, Fingerprint, FingerprintError, MatchMode};
use tracing::{info, warn};

use crate::metrics::metrics_recorder;
use crate::types::{Collection, MatchConfig, MatchError, MatchRecord, MatchScope, MatchStats, Origin};


/// Bulk duplicate matcher over slices of fingerprints.
///
/// Thresholds come from the shared [`AlgorithmRegistry`]; a pair matches
/// when its distance is at most the threshold of its algorithm for the
/// requested [`MatchMode`].
#[derive(Debug, Clone)]
pub struct MatchEngine {
    registry: Arc<AlgorithmRegistry>,
    config: MatchConfig,
}

/// Records and counters collected by every task of one run.
#[derive(Default)]
struct Sink {
    records: Vec<MatchRecord>,
    stats: MatchStats,
}

/// Per-task accumulator, flushed into the shared [`Sink`] once.
#[derive(Default)]
struct Batch {
    records: Vec<MatchRecord>,
    stats: MatchStats,
}

impl Batch {
    fn flush(self, sink: &Mutex<Sink>) {
        let mut guard = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.records.extend(self.records);
        guard.stats.merge(&self.stats);
    }
}

/// One side of a candidate pair.
#[derive(Clone, Copy)]
struct Side<'a> {
    fingerprint: &'a Fingerprint,
    origin: Origin,
}

impl MatchEngine {
    /// Construct an engine from a shared registry and a validated config.
    pub fn new(registry: Arc<AlgorithmRegistry>, config: MatchConfig) -> Result<Self, MatchError> {
        config.validate()?;
        Ok(Self { registry, config })
    }

    /// Engine over the built-in algorithms with the default config.
    pub fn with_defaults() -> Self {
        Self {
            registry: Arc::new(AlgorithmRegistry::with_defaults()),
            config: MatchConfig::default(),
        }
    }

    pub fn registry(&self) -> &Arc<AlgorithmRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Distance between `a` and `b` when they match under `mode`, `None`
    /// when they are comparable but too far apart.
    pub fn compare(
        &self,
        a: &Fingerprint,
        b: &Fingerprint,
        mode: MatchMode,
    ) -> Result<Option<f64>, MatchError> {
        let threshold = self.registry.threshold(a.algorithm(), mode)?;
        let distance = a.distance(b)?;
        Ok((distance <= threshold).then_some(distance))
    }

    /// Every matching pair within `items`, sorted by the positions of the
    /// two sides. Each unordered pair is compared once.
    pub fn find_matches(&self, items: &[Fingerprint], mode: MatchMode) -> Vec<MatchRecord> {
        self.find_matches_with_stats(items, mode).0
    }

    /// [`MatchEngine::find_matches`] plus the run's pair counters.
    pub fn find_matches_with_stats(
        &self,
        items: &[Fingerprint],
        mode: MatchMode,
    ) -> (Vec<MatchRecord>, MatchStats) {
        let started = Instant::now();
        let block_size = self.config.block_size;
        let blocks: Vec<(usize, &[Fingerprint])> = items
            .chunks(block_size)
            .enumerate()
            .map(|(b, chunk)| (b * block_size, chunk))
            .collect();
        let sink = Mutex::new(Sink::default());

        rayon::scope(|s| {
            for (b, &(start, block)) in blocks.iter().enumerate() {
                let sink = &sink;
                s.spawn(move |_| {
                    let mut batch = Batch::default();
                    for i in 0..block.len() {
                        for j in i + 1..block.len() {
                            let left = self.side(Collection::Left, &block[i], start + i);
                            let right = self.side(Collection::Left, &block[j], start + j);
                            self.check_pair(left, right, mode, MatchScope::IntraBlock, &mut batch);
                        }
                    }
                    batch.flush(sink);
                });

                for &(later_start, later) in &blocks[b + 1..] {
                    s.spawn(move |_| {
                        let mut batch = Batch::default();
                        for (i, x) in block.iter().enumerate() {
                            let left = self.side(Collection::Left, x, start + i);
                            for (j, y) in later.iter().enumerate() {
                                let right = self.side(Collection::Left, y, later_start + j);
                                self.check_pair(left, right, mode, MatchScope::CrossBlock, &mut batch);
                            }
                        }
                        batch.flush(sink);
                    });
                }
            }
        });

        self.finish(sink, mode, started, items.len(), 0)
    }

    /// Every matching pair between `left` and `right`, e.g. a fresh batch
    /// against an existing store. Records always hold the `left` member on
    /// their left side.
    pub fn find_matches_between(
        &self,
        left: &[Fingerprint],
        right: &[Fingerprint],
        mode: MatchMode,
    ) -> Vec<MatchRecord> {
        self.find_matches_between_with_stats(left, right, mode).0
    }

    /// [`MatchEngine::find_matches_between`] plus the run's pair counters.
    pub fn find_matches_between_with_stats(
        &self,
        left: &[Fingerprint],
        right: &[Fingerprint],
        mode: MatchMode,
    ) -> (Vec<MatchRecord>, MatchStats) {
        let started = Instant::now();
        let block_size = self.config.block_size;
        let sink = Mutex::new(Sink::default());

        rayon::scope(|s| {
            for (b, block) in left.chunks(block_size).enumerate() {
                let sink = &sink;
                s.spawn(move |_| {
                    let mut batch = Batch::default();
                    for (i, x) in block.iter().enumerate() {
                        let l = self.side(Collection::Left, x, b * block_size + i);
                        for (j, y) in right.iter().enumerate() {
                            let r = self.side(Collection::Right, y, j);
                            self.check_pair(l, r, mode, MatchScope::CrossCollection, &mut batch);
                        }
                    }
                    batch.flush(sink);
                });
            }
        });

        self.finish(sink, mode, started, left.len(), right.len())
    }

    fn side<'a>(&self, collection: Collection, fingerprint: &'a Fingerprint, position: usize) -> Side<'a> {
        Side {
            fingerprint,
            origin: Origin::new(collection, position, self.config.block_size),
        }
    }

    fn check_pair(
        &self,
        left: Side<'_>,
        right: Side<'_>,
        mode: MatchMode,
        scope: MatchScope,
        batch: &mut Batch,
    ) {
        if self.config.exclude_same_provenance && left.fingerprint.same_provenance(right.fingerprint) {
            batch.stats.same_provenance += 1;
            return;
        }

        batch.stats.compared += 1;
        match self.compare(left.fingerprint, right.fingerprint, mode) {
            Ok(Some(distance)) => {
                batch.stats.matched += 1;
                batch.records.push(MatchRecord {
                    left: left.fingerprint.clone(),
                    right: right.fingerprint.clone(),
                    left_origin: left.origin,
                    right_origin: right.origin,
                    distance,
                    mode,
                    scope,
                });
            }
            Ok(None) => {}
            Err(MatchError::Fingerprint(FingerprintError::UnknownAlgorithm(_))) => {
                batch.stats.unknown_algorithm += 1;
            }
            Err(_) => batch.stats.incomparable += 1,
        }
    }

    fn finish(
        &self,
        sink: Mutex<Sink>,
        mode: MatchMode,
        started: Instant,
        left_len: usize,
        right_len: usize,
    ) -> (Vec<MatchRecord>, MatchStats) {
        let Sink { mut records, stats } = sink.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        records.sort_by_key(|r| (r.left_origin.position, r.right_origin.position));

        let latency = started.elapsed();
        info!(
            %mode,
            left = left_len,
            right = right_len,
            compared = stats.compared,
            matched = stats.matched,
            skipped = stats.skipped(),
            elapsed_ms = latency.as_millis() as u64,
            "bulk match finished"
        );
        if stats.incomparable > 0 || stats.unknown_algorithm > 0 {
            warn!(
                incomparable = stats.incomparable,
                unknown_algorithm = stats.unknown_algorithm,
                "bulk match skipped pairs that could not be compared"
            );
        }
        if let Some(recorder) = metrics_recorder() {
            recorder.record_match(mode, latency, &stats);
        }

        (records, stats)
    }
}
