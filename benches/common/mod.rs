//! Common utilities for vpdedup benchmarks
//!
//! Seeded generators for clustered 64-bit hashes, so every bench run sees the
//! same data.

#![allow(dead_code)]

use vpdedup::Fingerprint;

pub const SEED: u64 = 0x5EED_F00D;

/// `count` hashes spread over `clusters` centres, each a few bits off its
/// centre. Clustered data is what real near-duplicate libraries look like
/// and is where the tree prunes well.
pub fn clustered_hashes(count: usize, clusters: usize) -> Vec<Fingerprint> {
    let mut rng = fastrand::Rng::with_seed(SEED);
    let centres: Vec<u64> = (0..clusters.max(1)).map(|_| rng.u64(..)).collect();
    (0..count)
        .map(|i| {
            let centre = centres[i % centres.len()];
            let noise = (0..rng.u32(0..4)).fold(0u64, |acc, _| acc | 1 << rng.u32(0..64));
            Fingerprint::from_words("dhash64", 64, &[centre ^ noise])
                .expect("valid 64-bit hash")
                .with_provenance(format!("/bench/{i}.jpg"))
        })
        .collect()
}

/// Uniformly random hashes; the worst case for metric pruning.
pub fn uniform_hashes(count: usize) -> Vec<Fingerprint> {
    let mut rng = fastrand::Rng::with_seed(SEED ^ 1);
    (0..count)
        .map(|_| Fingerprint::from_words("dhash64", 64, &[rng.u64(..)]).expect("valid 64-bit hash"))
        .collect()
}
