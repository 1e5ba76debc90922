//! Distance functions over fingerprint payloads.
//!
//! Hamming distances are computed over 64-bit blocks. Each block is XORed and
//! reduced with a branch-free mask/shift/add population count so the result
//! does not depend on a hardware `popcnt` instruction being available.

use crate::error::FingerprintError;
use crate::fingerprint::{Fingerprint, MetricKind};

const M1: u64 = 0x5555_5555_5555_5555;
const M2: u64 = 0x3333_3333_3333_3333;
const M4: u64 = 0x0f0f_0f0f_0f0f_0f0f;

/// Population count of a single 64-bit block.
#[inline]
pub fn popcount(x: u64) -> u32 {
    let mut x = x - ((x >> 1) & M1);
    x = (x & M2) + ((x >> 2) & M2);
    x = (x + (x >> 4)) & M4;
    x += x >> 8;
    x += x >> 16;
    x += x >> 32;
    (x & 0x7f) as u32
}

/// Hamming distance between two equally sized packed bit strings.
pub fn hamming_bytes(a: &[u8], b: &[u8]) -> u64 {
    debug_assert_eq!(a.len(), b.len());
    let mut total = 0u64;

    let mut left = a.chunks_exact(8);
    let mut right = b.chunks_exact(8);
    for (x, y) in (&mut left).zip(&mut right) {
        let x = u64::from_le_bytes([x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7]]);
        let y = u64::from_le_bytes([y[0], y[1], y[2], y[3], y[4], y[5], y[6], y[7]]);
        total += u64::from(popcount(x ^ y));
    }

    let (tail_a, tail_b) = (left.remainder(), right.remainder());
    if !tail_a.is_empty() {
        let mut x = [0u8; 8];
        let mut y = [0u8; 8];
        x[..tail_a.len()].copy_from_slice(tail_a);
        y[..tail_b.len()].copy_from_slice(tail_b);
        total += u64::from(popcount(u64::from_le_bytes(x) ^ u64::from_le_bytes(y)));
    }

    total
}

/// Euclidean distance between two equally sized little-endian `f32` vectors.
pub fn euclidean_bytes(a: &[u8], b: &[u8]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.chunks_exact(4)
        .zip(b.chunks_exact(4))
        .map(|(x, y)| {
            let x = f32::from_le_bytes([x[0], x[1], x[2], x[3]]) as f64;
            let y = f32::from_le_bytes([y[0], y[1], y[2], y[3]]) as f64;
            (x - y) * (x - y)
        })
        .sum::<f64>()
        .sqrt()
}

impl Fingerprint {
    /// Distance to `other` under this fingerprint's metric.
    ///
    /// Fails with [`FingerprintError::Comparability`] when algorithm, length
    /// or metric differ.
    pub fn distance(&self, other: &Fingerprint) -> Result<f64, FingerprintError> {
        if !self.is_comparable(other) {
            return Err(FingerprintError::Comparability {
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(match self.metric() {
            MetricKind::Hamming => hamming_bytes(self.payload(), other.payload()) as f64,
            MetricKind::Euclidean => euclidean_bytes(self.payload(), other.payload()),
        })
    }

    /// `distance(self, other) < threshold`.
    pub fn within_threshold(
        &self,
        other: &Fingerprint,
        threshold: f64,
    ) -> Result<bool, FingerprintError> {
        Ok(self.distance(other)? < threshold)
    }
}

/// Free-function form of [`Fingerprint::distance`].
pub fn distance(a: &Fingerprint, b: &Fingerprint) -> Result<f64, FingerprintError> {
    a.distance(b)
}

/// Free-function form of [`Fingerprint::within_threshold`]; the comparison is strict.
pub fn within_threshold(
    a: &Fingerprint,
    b: &Fingerprint,
    threshold: f64,
) -> Result<bool, FingerprintError> {
    a.within_threshold(b, threshold)
}
