//! Clustering of pairwise matches into duplicate groups.

use std::collections::HashMap;

use crate::types::{MatchRecord, Origin};

/// Disjoint-set forest with path halving and union by size.
struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new() -> Self {
        Self {
            parent: Vec::new(),
            size: Vec::new(),
        }
    }

    fn make(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.size.push(1);
        id
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut a, mut b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        if self.size[a] < self.size[b] {
            std::mem::swap(&mut a, &mut b);
        }
        self.parent[b] = a;
        self.size[a] += self.size[b];
    }
}

/// Group matched fingerprints into connected components.
///
/// Two origins share a group when a chain of match records links them.
/// Members are sorted within each group and groups are ordered by their
/// first member. Origins that never appear in a record are not reported.
pub fn group_matches(records: &[MatchRecord]) -> Vec<Vec<Origin>> {
    let mut ids: HashMap<Origin, usize> = HashMap::new();
    let mut origins = Vec::new();
    let mut sets = DisjointSet::new();

    let mut id_of = |origin: Origin, sets: &mut DisjointSet| {
        *ids.entry(origin).or_insert_with(|| {
            origins.push(origin);
            sets.make()
        })
    };

    for record in records {
        let a = id_of(record.left_origin, &mut sets);
        let b = id_of(record.right_origin, &mut sets);
        sets.union(a, b);
    }

    let mut groups: HashMap<usize, Vec<Origin>> = HashMap::new();
    for (id, origin) in origins.into_iter().enumerate() {
        groups.entry(sets.find(id)).or_default().push(origin);
    }

    let mut groups: Vec<Vec<Origin>> = groups
        .into_values()
        .map(|mut members| {
            members.sort_unstable();
            members
        })
        .collect();
    groups.sort_unstable_by_key(|members| members[0]);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Collection, MatchScope};
    use fingerprint::{Fingerprint, MatchMode};

    fn record(a: usize, b: usize) -> MatchRecord {
        let fp = Fingerprint::from_words("dhash64", 64, &[0]).unwrap();
        MatchRecord {
            left: fp.clone(),
            right: fp,
            left_origin: Origin::new(Collection::Left, a, 4),
            right_origin: Origin::new(Collection::Left, b, 4),
            distance: 0.0,
            mode: MatchMode::Exact,
            scope: MatchScope::IntraBlock,
        }
    }

    fn positions(groups: &[Vec<Origin>]) -> Vec<Vec<usize>> {
        groups
            .iter()
            .map(|g| g.iter().map(|o| o.position).collect())
            .collect()
    }

    #[test]
    fn chains_collapse_into_one_group() {
        let groups = group_matches(&[record(7, 9), record(1, 3), record(3, 7), record(4, 5)]);
        assert_eq!(positions(&groups), vec![vec![1, 3, 7, 9], vec![4, 5]]);
    }

    #[test]
    fn empty_input_has_no_groups() {
        assert!(group_matches(&[]).is_empty());
    }

    #[test]
    fn collections_are_kept_apart() {
        let mut cross = record(2, 2);
        cross.right_origin.collection = Collection::Right;
        let groups = group_matches(&[cross]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }
}
