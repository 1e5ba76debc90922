//! # vpdedup Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` finds every pair of near-duplicate fingerprints in a collection
//! (or between two collections) under a [`MatchMode`] policy. It sits beside
//! the store layer: stores hand it their full contents, and downstream
//! deduplication logic consumes the resulting [`MatchRecord`]s.
//!
//! The input is split into fixed-size blocks. Every block is compared against
//! itself, and against every later block, as independent rayon tasks, so each
//! unordered pair is evaluated exactly once and no pair is reported twice.
//!
//! ## Core Types
//!
//! - [`MatchEngine`]: the bulk matcher, holding a shared
//!   [`fingerprint::AlgorithmRegistry`] for per-algorithm thresholds.
//! - [`MatchConfig`]: block size, default mode and the same-provenance rule.
//! - [`MatchRecord`]: both fingerprints, their [`Origin`]s, the measured
//!   distance and the [`MatchScope`] of the pairing.
//! - [`MatchStats`]: pair counters for one run.
//! - [`group_matches`]: union-find clustering of records into duplicate groups.
//!
//! Pairs that cannot be compared (different shapes, or an unregistered
//! algorithm) are skipped and counted; they never abort the run.
//!
//! ## Example Usage
//!
//! ```
//! use fingerprint::{Fingerprint, MatchMode};
//! use matcher::{group_matches, MatchEngine};
//!
//! let items: Vec<Fingerprint> = [0u64, 0b11, 0xFFFF, 0xFFFE]
//!     .iter()
//!     .map(|w| Fingerprint::from_words("dhash64", 64, &[*w]).unwrap())
//!     .collect();
//!
//! let engine = MatchEngine::with_defaults();
//! let matches = engine.find_matches(&items, MatchMode::Strict);
//! assert_eq!(matches.len(), 2);
//! assert_eq!(matches[0].left_origin.position, 0);
//! assert_eq!(matches[0].right_origin.position, 1);
//!
//! let groups = group_matches(&matches);
//! assert_eq!(groups.len(), 2);
//! ```
//!
//! ## Observability
//!
//! Every run logs a `tracing` event with its counters. Install a
//! [`MatchMetrics`] implementation via [`set_match_metrics`] to forward
//! latency and counters to a metrics backend; this is typically done once
//! during startup.

pub mod engine;
pub mod group;
pub mod metrics;
pub mod types;

pub use fingerprint::MatchMode;

pub use crate::engine::MatchEngine;
pub use crate::group::group_matches;
pub use crate::metrics::{set_match_metrics, MatchMetrics};
pub use crate::types::{
    Collection, MatchConfig, MatchError, MatchRecord, MatchScope, MatchStats, Origin,
    DEFAULT_BLOCK_SIZE,
};
