//! The fingerprint value type.
//!
//! A [`Fingerprint`] is immutable once built. Every constructor validates the
//! payload against the declared length and metric, so the rest of the
//! workspace can assume a well-formed value.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FingerprintError;

/// Distance family used to compare two fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Bit-level Hamming distance over a packed bit string.
    Hamming,
    /// L2 distance over a vector of `f32` components.
    Euclidean,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Hamming => "hamming",
            MetricKind::Euclidean => "euclidean",
        }
    }

    /// Number of payload bytes needed to hold a fingerprint of `length`.
    ///
    /// `length` counts bits for [`MetricKind::Hamming`] and components for
    /// [`MetricKind::Euclidean`]. `None` when the byte count overflows.
    pub fn payload_len(&self, length: usize) -> Option<usize> {
        match self {
            MetricKind::Hamming => Some(length.div_ceil(8)),
            MetricKind::Euclidean => length.checked_mul(4),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hamming" => Ok(MetricKind::Hamming),
            "euclidean" => Ok(MetricKind::Euclidean),
            other => Err(FingerprintError::parse(format!(
                "unknown metric kind `{other}`"
            ))),
        }
    }
}

/// The comparability key of a fingerprint: algorithm, length and metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FingerprintShape {
    pub algorithm: String,
    pub length: usize,
    pub metric: MetricKind,
}

impl FingerprintShape {
    pub fn new<A: Into<String>>(algorithm: A, length: usize, metric: MetricKind) -> Self {
        Self {
            algorithm: algorithm.into(),
            length,
            metric,
        }
    }
}

impl fmt::Display for FingerprintShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.algorithm, self.length, self.metric)
    }
}

/// A fixed-shape perceptual fingerprint.
///
/// Equality and hashing cover the algorithm identifier, length, metric and
/// payload. Provenance is carried along for reporting only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "FingerprintRepr")]
pub struct Fingerprint {
    algorithm: String,
    length: usize,
    metric: MetricKind,
    payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provenance: Option<String>,
}

/// Unvalidated wire form; deserialization funnels through [`Fingerprint::from_parts`].
#[derive(Deserialize)]
struct FingerprintRepr {
    algorithm: String,
    length: usize,
    metric: MetricKind,
    payload: Vec<u8>,
    #[serde(default)]
    provenance: Option<String>,
}

impl TryFrom<FingerprintRepr> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(repr: FingerprintRepr) -> Result<Self, Self::Error> {
        let fp = Fingerprint::from_parts(repr.algorithm, repr.length, repr.metric, repr.payload)?;
        Ok(match repr.provenance {
            Some(provenance) => fp.with_provenance(provenance),
            None => fp,
        })
    }
}

impl Fingerprint {
    /// Build a fingerprint from its raw payload bytes.
    ///
    /// Hamming payloads hold `ceil(length / 8)` bytes with bit `i` stored in
    /// byte `i / 8` at position `i % 8`; unused high bits of the last byte are
    /// cleared. Euclidean payloads hold `length` little-endian `f32` values;
    /// non-finite components are rejected and `-0.0` is stored as `0.0`.
    pub fn from_parts<A: Into<String>>(
        algorithm: A,
        length: usize,
        metric: MetricKind,
        mut payload: Vec<u8>,
    ) -> Result<Self, FingerprintError> {
        let algorithm = algorithm.into();
        validate_algorithm_id(&algorithm)?;
        if length == 0 {
            return Err(FingerprintError::invalid("fingerprint length must be > 0"));
        }
        let expected = metric.payload_len(length).ok_or_else(|| {
            FingerprintError::invalid(format!("{metric} fingerprint length {length} is too large"))
        })?;
        if payload.len() != expected {
            return Err(FingerprintError::invalid(format!(
                "{metric} fingerprint of length {length} needs {expected} payload bytes, got {}",
                payload.len()
            )));
        }

        match metric {
            MetricKind::Hamming => {
                let tail_bits = length % 8;
                if tail_bits != 0 {
                    if let Some(last) = payload.last_mut() {
                        *last &= (1u8 << tail_bits) - 1;
                    }
                }
            }
            MetricKind::Euclidean => {
                for (i, chunk) in payload.chunks_exact_mut(4).enumerate() {
                    let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    if !value.is_finite() {
                        return Err(FingerprintError::invalid(format!(
                            "non-finite component at index {i}"
                        )));
                    }
                    if value == 0.0 {
                        chunk.copy_from_slice(&0.0f32.to_le_bytes());
                    }
                }
            }
        }

        Ok(Self {
            algorithm,
            length,
            metric,
            payload,
            provenance: None,
        })
    }

    /// Build a Hamming fingerprint from individual bits.
    pub fn from_bits<A: Into<String>>(algorithm: A, bits: &[bool]) -> Result<Self, FingerprintError> {
        let mut payload = vec![0u8; bits.len().div_ceil(8)];
        for (i, _) in bits.iter().enumerate().filter(|(_, bit)| **bit) {
            payload[i / 8] |= 1 << (i % 8);
        }
        Self::from_parts(algorithm, bits.len(), MetricKind::Hamming, payload)
    }

    /// Build a Hamming fingerprint of `length` bits from 64-bit words.
    ///
    /// Bit `i` is bit `i % 64` of word `i / 64`. Words beyond `length` are
    /// ignored; too few words is an error.
    pub fn from_words<A: Into<String>>(
        algorithm: A,
        length: usize,
        words: &[u64],
    ) -> Result<Self, FingerprintError> {
        if words.len() * 64 < length {
            return Err(FingerprintError::invalid(format!(
                "{} words cannot hold {length} bits",
                words.len()
            )));
        }
        let mut payload: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        payload.truncate(length.div_ceil(8));
        Self::from_parts(algorithm, length, MetricKind::Hamming, payload)
    }

    /// Build a Euclidean fingerprint from vector components.
    pub fn from_vector<A: Into<String>>(
        algorithm: A,
        values: &[f32],
    ) -> Result<Self, FingerprintError> {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_parts(algorithm, values.len(), MetricKind::Euclidean, payload)
    }

    /// Attach an origin marker (path, URL, ...).
    pub fn with_provenance<P: Into<String>>(mut self, provenance: P) -> Self {
        self.provenance = Some(provenance.into());
        self
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn metric(&self) -> MetricKind {
        self.metric
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn provenance(&self) -> Option<&str> {
        self.provenance.as_deref()
    }

    pub fn shape(&self) -> FingerprintShape {
        FingerprintShape::new(self.algorithm.clone(), self.length, self.metric)
    }

    /// True when `shape` describes this fingerprint.
    pub fn has_shape(&self, shape: &FingerprintShape) -> bool {
        self.algorithm == shape.algorithm && self.length == shape.length && self.metric == shape.metric
    }

    pub fn is_comparable(&self, other: &Fingerprint) -> bool {
        self.algorithm == other.algorithm
            && self.length == other.length
            && self.metric == other.metric
    }

    /// Bit `index` of a Hamming fingerprint; `None` for Euclidean or out of range.
    pub fn bit(&self, index: usize) -> Option<bool> {
        if self.metric != MetricKind::Hamming || index >= self.length {
            return None;
        }
        Some(self.payload[index / 8] & (1 << (index % 8)) != 0)
    }

    /// Decoded components of a Euclidean fingerprint.
    pub fn components(&self) -> Option<Vec<f32>> {
        if self.metric != MetricKind::Euclidean {
            return None;
        }
        Some(
            self.payload
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    /// True when both fingerprints carry the same, present provenance.
    pub fn same_provenance(&self, other: &Fingerprint) -> bool {
        matches!((&self.provenance, &other.provenance), (Some(a), Some(b)) if a == b)
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.is_comparable(other) && self.payload == other.payload
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.algorithm.hash(state);
        self.length.hash(state);
        self.metric.hash(state);
        self.payload.hash(state);
    }
}

/// Algorithm identifiers end up as a bare field in the text format.
pub(crate) fn validate_algorithm_id(id: &str) -> Result<(), FingerprintError> {
    if id.is_empty() {
        return Err(FingerprintError::invalid("algorithm id must not be empty"));
    }
    if id.chars().any(|c| c == ',' || c.is_whitespace()) {
        return Err(FingerprintError::invalid(format!(
            "algorithm id `{id}` must not contain commas or whitespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn from_bits_packs_lsb_first() {
        let fp = Fingerprint::from_bits("ahash", &[true, false, false, true]).unwrap();
        assert_eq!(fp.payload(), &[0b1001]);
        assert_eq!(fp.length(), 4);
        assert_eq!(fp.bit(0), Some(true));
        assert_eq!(fp.bit(1), Some(false));
        assert_eq!(fp.bit(3), Some(true));
        assert_eq!(fp.bit(4), None);
    }

    #[test]
    fn from_parts_clears_unused_tail_bits() {
        let fp = Fingerprint::from_parts("ahash", 4, MetricKind::Hamming, vec![0xFF]).unwrap();
        assert_eq!(fp.payload(), &[0x0F]);
    }

    #[test]
    fn from_parts_rejects_wrong_payload_size() {
        let err = Fingerprint::from_parts("dhash64", 64, MetricKind::Hamming, vec![0; 4])
            .expect_err("payload too short");
        assert!(matches!(err, FingerprintError::InvalidArgument(_)));
    }

    #[test]
    fn from_parts_rejects_overflowing_length() {
        assert_eq!(MetricKind::Euclidean.payload_len(usize::MAX / 2), None);
        let err = Fingerprint::from_parts("emb", usize::MAX / 2, MetricKind::Euclidean, vec![])
            .expect_err("length overflows payload size");
        assert!(matches!(err, FingerprintError::InvalidArgument(_)));
    }

    #[test]
    fn from_parts_rejects_zero_length() {
        let err = Fingerprint::from_parts("dhash64", 0, MetricKind::Hamming, vec![])
            .expect_err("zero length");
        assert!(err.to_string().contains("length"));
    }

    #[test]
    fn algorithm_id_must_not_contain_delimiter() {
        assert!(Fingerprint::from_bits("d,hash", &[true]).is_err());
        assert!(Fingerprint::from_bits("d hash", &[true]).is_err());
        assert!(Fingerprint::from_bits("", &[true]).is_err());
    }

    #[test]
    fn from_words_truncates_to_length() {
        let fp = Fingerprint::from_words("bh", 65, &[u64::MAX, u64::MAX]).unwrap();
        assert_eq!(fp.payload().len(), 9);
        assert_eq!(fp.payload()[8], 0x01);
        assert!(Fingerprint::from_words("bh", 129, &[0, 0]).is_err());
    }

    #[test]
    fn from_vector_rejects_non_finite() {
        assert!(Fingerprint::from_vector("emb", &[1.0, f32::NAN]).is_err());
        assert!(Fingerprint::from_vector("emb", &[f32::INFINITY]).is_err());
    }

    #[test]
    fn from_vector_normalizes_negative_zero() {
        let a = Fingerprint::from_vector("emb", &[-0.0, 1.5]).unwrap();
        let b = Fingerprint::from_vector("emb", &[0.0, 1.5]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.components(), Some(vec![0.0, 1.5]));
    }

    #[test]
    fn equality_ignores_provenance() {
        let a = Fingerprint::from_words("dhash64", 64, &[7]).unwrap();
        let b = a.clone().with_provenance("/tmp/b.png");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn equality_requires_same_shape() {
        let a = Fingerprint::from_words("dhash64", 64, &[7]).unwrap();
        let b = Fingerprint::from_words("ahash64", 64, &[7]).unwrap();
        assert_ne!(a, b);
        assert!(!a.is_comparable(&b));
    }

    #[test]
    fn same_provenance_requires_both_present() {
        let a = Fingerprint::from_words("dhash64", 64, &[1]).unwrap();
        let b = a.clone();
        assert!(!a.same_provenance(&b));

        let a = a.with_provenance("x.jpg");
        let b = b.with_provenance("x.jpg");
        assert!(a.same_provenance(&b));
    }

    #[test]
    fn serde_roundtrip_validates() {
        let fp = Fingerprint::from_vector("emb", &[0.25, -1.0])
            .unwrap()
            .with_provenance("s3://bucket/a.jpg");
        let json = serde_json::to_string(&fp).unwrap();
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
        assert_eq!(back.provenance(), Some("s3://bucket/a.jpg"));

        let bad = r#"{"algorithm":"emb","length":2,"metric":"euclidean","payload":[0,0,0]}"#;
        assert!(serde_json::from_str::<Fingerprint>(bad).is_err());
    }

    #[test]
    fn metric_kind_parses_and_displays() {
        assert_eq!("hamming".parse::<MetricKind>().unwrap(), MetricKind::Hamming);
        assert_eq!(MetricKind::Euclidean.to_string(), "euclidean");
        assert!("cosine".parse::<MetricKind>().is_err());
    }
}
