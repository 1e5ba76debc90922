//! # vpdedup Fingerprints
//!
//! This crate defines the comparable value that every other vpdedup layer
//! stores, indexes and matches: a fixed-shape perceptual [`Fingerprint`]
//! produced by some image hashing algorithm.
//!
//! ## Contract
//!
//! - Producers (dHash, aHash, pHash, embedding models, ...) live outside this
//!   workspace. They hand over a finished fingerprint; nothing here inspects
//!   pixels.
//! - Two fingerprints are comparable only when their algorithm identifier,
//!   length and [`MetricKind`] agree. Comparing anything else fails with
//!   [`FingerprintError::Comparability`].
//! - Provenance (a path or URL) travels with the fingerprint but never takes
//!   part in equality, hashing or distance.
//!
//! ## Metrics
//!
//! - **Hamming** over packed bits: XOR over 64-bit blocks followed by a
//!   shift-and-add population count.
//! - **Euclidean** over `f32` vectors: the L2 norm of the difference,
//!   accumulated in `f64`.
//!
//! ## Text format
//!
//! Fingerprints serialize to one line:
//! `<hex payload>,<algorithm>,<length>,<metric>[,<provenance>]`. Provenance
//! escapes `\`, `,`, `\n` and `\r` so that a line always holds exactly one
//! record.
//!
//! ## Example Usage
//!
//! ```
//! use fingerprint::{AlgorithmRegistry, Fingerprint, MatchMode};
//!
//! let registry = AlgorithmRegistry::with_defaults();
//!
//! let a = Fingerprint::from_words("dhash64", 64, &[0xFF00_FF00_FF00_FF00]).unwrap();
//! let b = Fingerprint::from_words("dhash64", 64, &[0xFF00_FF00_FF00_FF01])
//!     .unwrap()
//!     .with_provenance("/photos/b.jpg");
//!
//! assert_eq!(a.distance(&b).unwrap(), 1.0);
//! assert!(a.distance(&b).unwrap() <= registry.threshold("dhash64", MatchMode::Strict).unwrap());
//!
//! let line = b.to_line();
//! assert_eq!(Fingerprint::parse(&line).unwrap(), b);
//! ```

mod codec;
mod error;
pub mod fingerprint;
pub mod metric;
mod mode;
pub mod registry;

pub use crate::error::FingerprintError;
pub use crate::fingerprint::{Fingerprint, FingerprintShape, MetricKind};
pub use crate::metric::{distance, within_threshold};
pub use crate::mode::MatchMode;
pub use crate::registry::{AlgorithmRegistry, AlgorithmSpec, MatchThresholds, RegistryBuilder};
