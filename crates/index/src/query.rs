use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};

use crate::{IndexError, VpTree};

/// Result entry for a proximity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// The indexed member.
    pub fingerprint: Fingerprint,
    /// Distance from the query to `fingerprint`.
    pub distance: f64,
}

/// Heap entry ordered by distance so the worst candidate sits on top.
struct Candidate<'a> {
    distance: f64,
    fingerprint: &'a Fingerprint,
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance.total_cmp(&other.distance)
    }
}

/// Bounded max-heap of the best `k` candidates seen so far.
struct CandidateSet<'a> {
    k: usize,
    heap: BinaryHeap<Candidate<'a>>,
}

impl<'a> CandidateSet<'a> {
    fn new(k: usize, expected: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(expected) + 1),
        }
    }

    /// Worst kept distance, infinite until `k` candidates are held.
    fn tau(&self) -> f64 {
        if self.heap.len() < self.k {
            return f64::INFINITY;
        }
        self.heap.peek().map_or(f64::INFINITY, |c| c.distance)
    }

    fn offer(&mut self, fingerprint: &'a Fingerprint, distance: f64) {
        self.heap.push(Candidate {
            distance,
            fingerprint,
        });
        if self.heap.len() > self.k {
            self.heap.pop();
        }
    }

    fn into_sorted(self) -> Vec<Neighbor> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                fingerprint: c.fingerprint.clone(),
                distance: c.distance,
            })
            .collect()
    }
}

/// Proximity queries.
impl VpTree {
    /// The `k` members closest to `query`, ascending by distance.
    ///
    /// Returns every member when `k` is at least [`VpTree::len`]. Unindexed
    /// extras are scanned linearly into the same candidate set, so results
    /// stay exact between rebuilds.
    pub fn k_nearest(&self, query: &Fingerprint, k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be greater than zero".into()));
        }
        self.check_shape(query)?;

        let mut candidates = CandidateSet::new(k, self.len());
        for extra in &self.extras {
            candidates.offer(extra, query.distance(extra)?);
        }

        let mut work: Vec<_> = self.arena.root().into_iter().collect();
        while let Some(id) = work.pop() {
            let Some(node) = self.arena.get(id) else {
                continue;
            };
            let d = query.distance(&node.vantage)?;
            candidates.offer(&node.vantage, d);
            let tau = candidates.tau();

            if d < node.radius - tau {
                work.extend(node.inner);
            } else if d > node.radius + tau {
                work.extend(node.outer);
            } else {
                // Inner popped first: it is where close members usually live.
                work.extend(node.outer);
                work.extend(node.inner);
            }
        }

        Ok(candidates.into_sorted())
    }

    /// The single closest member, if any.
    pub fn nearest(&self, query: &Fingerprint) -> Result<Option<Neighbor>, IndexError> {
        Ok(self.k_nearest(query, 1)?.into_iter().next())
    }

    /// Every member within `radius` (inclusive) of `query`, ascending by
    /// distance.
    pub fn within(&self, query: &Fingerprint, radius: f64) -> Result<Vec<Neighbor>, IndexError> {
        if radius.is_nan() || radius < 0.0 {
            return Err(IndexError::InvalidArgument(format!(
                "search radius must be >= 0, got {radius}"
            )));
        }
        self.check_shape(query)?;

        let mut found = Vec::new();
        for extra in &self.extras {
            let d = query.distance(extra)?;
            if d <= radius {
                found.push(Neighbor {
                    fingerprint: extra.clone(),
                    distance: d,
                });
            }
        }

        let mut work: Vec<_> = self.arena.root().into_iter().collect();
        while let Some(id) = work.pop() {
            let Some(node) = self.arena.get(id) else {
                continue;
            };
            let d = query.distance(&node.vantage)?;
            if d <= radius {
                found.push(Neighbor {
                    fingerprint: node.vantage.clone(),
                    distance: d,
                });
            }
            if d <= node.radius + radius {
                work.extend(node.inner);
            }
            if d + radius > node.radius {
                work.extend(node.outer);
            }
        }

        found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(found)
    }
}
