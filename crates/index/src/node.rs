//! Vantage-point nodes and their construction.
//!
//! Nodes live in an index-based [`Arena`]; children are arena slots, not
//! boxes. Construction never recurses on the call stack. Pending partitions
//! sit on an explicit work list:
//!
//! 1. Partitions larger than `parallel_threshold` are split level by level,
//!    the whole frontier at once, on the rayon pool.
//! 2. Partitions at or below the threshold are built sequentially, each as an
//!    independent rayon task writing into its own sub-arena.
//! 3. Sub-arenas are grafted back into the parent arena at their slot.
//!
//! Tasks only ever own disjoint partitions, so no locking is needed.

use fingerprint::Fingerprint;
use rayon::prelude::*;

use crate::{IndexConfig, IndexError};

pub(crate) type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Inner,
    Outer,
}

/// Where a subtree hangs: the tree root, or one child slot of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Root,
    Child(NodeId, Side),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) vantage: Fingerprint,
    /// Median vantage distance of the partition at construction time.
    pub(crate) radius: f64,
    pub(crate) inner: Option<NodeId>,
    pub(crate) outer: Option<NodeId>,
}

impl Node {
    pub(crate) fn leaf(vantage: Fingerprint) -> Self {
        Self {
            vantage,
            radius: 0.0,
            inner: None,
            outer: None,
        }
    }

    pub(crate) fn child(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Inner => self.inner,
            Side::Outer => self.outer,
        }
    }

    /// Side a member at `distance` from the vantage belongs to.
    pub(crate) fn side_for(&self, distance: f64) -> Side {
        if distance <= self.radius {
            Side::Inner
        } else {
            Side::Outer
        }
    }
}

/// Slot-addressed node storage. Released slots are recycled.
#[derive(Debug, Clone, Default)]
pub(crate) struct Arena {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
}

impl Arena {
    pub(crate) fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id).and_then(Option::as_mut)
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    pub(crate) fn child(&self, slot: Slot) -> Option<NodeId> {
        match slot {
            Slot::Root => self.root,
            Slot::Child(parent, side) => self.get(parent).and_then(|n| n.child(side)),
        }
    }

    pub(crate) fn attach(&mut self, slot: Slot, id: NodeId) {
        self.set_child(slot, Some(id));
    }

    pub(crate) fn detach(&mut self, slot: Slot) -> Option<NodeId> {
        let current = self.child(slot);
        self.set_child(slot, None);
        current
    }

    fn set_child(&mut self, slot: Slot, id: Option<NodeId>) {
        match slot {
            Slot::Root => self.root = id,
            Slot::Child(parent, side) => {
                if let Some(node) = self.get_mut(parent) {
                    match side {
                        Side::Inner => node.inner = id,
                        Side::Outer => node.outer = id,
                    }
                }
            }
        }
    }

    /// Release the subtree rooted at `id` and return its members, the
    /// subtree root's vantage first.
    pub(crate) fn take_subtree(&mut self, id: NodeId) -> Vec<Fingerprint> {
        let mut members = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current).and_then(Option::take) else {
                continue;
            };
            self.free.push(current);
            stack.extend(node.outer);
            stack.extend(node.inner);
            members.push(node.vantage);
        }
        members
    }

    /// Move every node of `other` into this arena, filling released slots
    /// before growing. Returns the new slot of `other`'s root.
    pub(crate) fn graft(&mut self, other: Arena) -> Option<NodeId> {
        let mut ids = vec![None; other.nodes.len()];
        for (i, node) in other.nodes.iter().enumerate() {
            if node.is_some() {
                ids[i] = Some(self.reserve());
            }
        }
        let remap = |c: NodeId| ids.get(c).copied().flatten();
        for (i, node) in other.nodes.into_iter().enumerate() {
            let (Some(mut node), Some(id)) = (node, ids[i]) else {
                continue;
            };
            node.inner = node.inner.and_then(remap);
            node.outer = node.outer.and_then(remap);
            self.nodes[id] = Some(node);
        }
        other.root.and_then(remap)
    }

    /// An empty slot, recycled when one is free.
    fn reserve(&mut self) -> NodeId {
        self.free.pop().unwrap_or_else(|| {
            self.nodes.push(None);
            self.nodes.len() - 1
        })
    }

    /// Allocated slots, live or released.
    pub(crate) fn slots(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    pub(crate) fn live(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Longest root-to-leaf path, counted in nodes.
    pub(crate) fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(NodeId, usize)> = self.root.map(|r| (r, 1)).into_iter().collect();
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            deepest = deepest.max(depth);
            stack.extend(node.inner.map(|c| (c, depth + 1)));
            stack.extend(node.outer.map(|c| (c, depth + 1)));
        }
        deepest
    }
}

struct Pending {
    items: Vec<Fingerprint>,
    slot: Slot,
}

struct Split {
    vantage: Fingerprint,
    radius: f64,
    inner: Vec<Fingerprint>,
    outer: Vec<Fingerprint>,
}

/// Build an arena holding a balanced vantage-point tree over `items`.
pub(crate) fn build(items: Vec<Fingerprint>, config: &IndexConfig) -> Result<Arena, IndexError> {
    let Some(first) = items.first() else {
        return Err(IndexError::InvalidArgument(
            "cannot build a vantage-point tree from an empty list".into(),
        ));
    };
    if let Some(odd) = items.iter().find(|x| !x.is_comparable(first)) {
        return Err(fingerprint::FingerprintError::Comparability {
            left: first.shape(),
            right: odd.shape(),
        }
        .into());
    }

    let threshold = config.parallel_threshold.max(1);
    let mut arena = Arena::default();
    let mut frontier = vec![Pending {
        items,
        slot: Slot::Root,
    }];
    let mut small = Vec::new();

    loop {
        let (large, rest): (Vec<Pending>, Vec<Pending>) = std::mem::take(&mut frontier)
            .into_iter()
            .partition(|p| p.items.len() > threshold);
        small.extend(rest);
        if large.is_empty() {
            break;
        }

        let splits = large
            .into_par_iter()
            .map(|p| {
                let mut rng = task_rng(config.seed, p.slot);
                split(p.items, &mut rng).map(|s| (p.slot, s))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (slot, s) in splits {
            let id = arena.alloc(Node {
                vantage: s.vantage,
                radius: s.radius,
                inner: None,
                outer: None,
            });
            arena.attach(slot, id);
            if !s.inner.is_empty() {
                frontier.push(Pending {
                    items: s.inner,
                    slot: Slot::Child(id, Side::Inner),
                });
            }
            if !s.outer.is_empty() {
                frontier.push(Pending {
                    items: s.outer,
                    slot: Slot::Child(id, Side::Outer),
                });
            }
        }
    }

    let subtrees = small
        .into_par_iter()
        .map(|p| {
            let mut rng = task_rng(config.seed, p.slot);
            build_sequential(p.items, &mut rng).map(|sub| (p.slot, sub))
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (slot, sub) in subtrees {
        if let Some(root) = arena.graft(sub) {
            arena.attach(slot, root);
        }
    }

    Ok(arena)
}

fn build_sequential(items: Vec<Fingerprint>, rng: &mut fastrand::Rng) -> Result<Arena, IndexError> {
    let mut arena = Arena::default();
    let mut stack = vec![Pending {
        items,
        slot: Slot::Root,
    }];

    while let Some(p) = stack.pop() {
        if p.items.is_empty() {
            continue;
        }
        let s = split(p.items, rng)?;
        let id = arena.alloc(Node {
            vantage: s.vantage,
            radius: s.radius,
            inner: None,
            outer: None,
        });
        arena.attach(p.slot, id);
        stack.push(Pending {
            items: s.outer,
            slot: Slot::Child(id, Side::Outer),
        });
        stack.push(Pending {
            items: s.inner,
            slot: Slot::Child(id, Side::Inner),
        });
    }

    Ok(arena)
}

/// Pick a random vantage, take the lower median of its distances as radius
/// and partition the remaining members around it.
fn split(mut items: Vec<Fingerprint>, rng: &mut fastrand::Rng) -> Result<Split, IndexError> {
    let vantage = items.swap_remove(rng.usize(..items.len()));
    if items.is_empty() {
        return Ok(Split {
            vantage,
            radius: 0.0,
            inner: Vec::new(),
            outer: Vec::new(),
        });
    }

    let distances = items
        .iter()
        .map(|x| vantage.distance(x))
        .collect::<Result<Vec<f64>, _>>()?;
    let radius = lower_median(&distances);

    let mut inner = Vec::with_capacity(items.len() / 2 + 1);
    let mut outer = Vec::with_capacity(items.len() / 2);
    for (x, d) in items.into_iter().zip(distances) {
        if d <= radius {
            inner.push(x);
        } else {
            outer.push(x);
        }
    }

    Ok(Split {
        vantage,
        radius,
        inner,
        outer,
    })
}

/// Median of a non-empty slice; the lower middle value on even counts.
fn lower_median(distances: &[f64]) -> f64 {
    let mut scratch = distances.to_vec();
    let mid = (scratch.len() - 1) / 2;
    let (_, median, _) = scratch.select_nth_unstable_by(mid, f64::total_cmp);
    *median
}

fn task_rng(seed: Option<u64>, slot: Slot) -> fastrand::Rng {
    let salt = match slot {
        Slot::Root => 0,
        Slot::Child(id, Side::Inner) => (id as u64 + 1) * 2,
        Slot::Child(id, Side::Outer) => (id as u64 + 1) * 2 + 1,
    };
    match seed {
        Some(seed) => fastrand::Rng::with_seed(seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => fastrand::Rng::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(v: u64) -> Fingerprint {
        Fingerprint::from_words("dhash64", 64, &[v]).unwrap()
    }

    fn sample(n: u64) -> Vec<Fingerprint> {
        (0..n).map(|i| word(i.wrapping_mul(0x9E37_79B9_7F4A_7C15))).collect()
    }

    /// Every member of every inner subtree sits within the radius, every
    /// outer member strictly beyond it.
    fn assert_partition_invariant(arena: &Arena) {
        for node in arena.iter() {
            for (side, child) in [(Side::Inner, node.inner), (Side::Outer, node.outer)] {
                let Some(child) = child else { continue };
                let mut stack = vec![child];
                while let Some(id) = stack.pop() {
                    let member = arena.get(id).unwrap();
                    let d = node.vantage.distance(&member.vantage).unwrap();
                    match side {
                        Side::Inner => assert!(d <= node.radius, "inner {d} > {}", node.radius),
                        Side::Outer => assert!(d > node.radius, "outer {d} <= {}", node.radius),
                    }
                    stack.extend(member.inner);
                    stack.extend(member.outer);
                }
            }
        }
    }

    #[test]
    fn lower_median_takes_lower_middle_on_even_counts() {
        assert_eq!(lower_median(&[4.0, 1.0, 3.0, 2.0]), 2.0);
        assert_eq!(lower_median(&[5.0, 1.0, 3.0]), 3.0);
        assert_eq!(lower_median(&[7.0]), 7.0);
    }

    #[test]
    fn single_element_is_a_leaf() {
        let arena = build(vec![word(1)], &IndexConfig::default()).unwrap();
        let root = arena.get(arena.root().unwrap()).unwrap();
        assert_eq!(root.radius, 0.0);
        assert!(root.inner.is_none() && root.outer.is_none());
        assert_eq!(arena.live(), 1);
    }

    #[test]
    fn empty_input_is_invalid() {
        let err = build(Vec::new(), &IndexConfig::default()).expect_err("empty");
        assert!(matches!(err, IndexError::InvalidArgument(_)));
    }

    #[test]
    fn mixed_shapes_are_rejected_up_front() {
        let other = Fingerprint::from_words("ahash64", 64, &[1]).unwrap();
        let err = build(vec![word(1), word(2), other], &IndexConfig::default()).expect_err("mixed");
        assert!(matches!(err, IndexError::Fingerprint(_)));
    }

    #[test]
    fn sequential_build_keeps_invariant() {
        let config = IndexConfig::default().with_parallel_threshold(usize::MAX);
        let arena = build(sample(300), &config).unwrap();
        assert_eq!(arena.live(), 300);
        assert_partition_invariant(&arena);
    }

    #[test]
    fn parallel_build_keeps_invariant() {
        let config = IndexConfig::default().with_parallel_threshold(8);
        let arena = build(sample(1000), &config).unwrap();
        assert_eq!(arena.live(), 1000);
        assert_partition_invariant(&arena);
    }

    #[test]
    fn identical_members_build_without_recursion() {
        let items = vec![word(42); 5000];
        let config = IndexConfig::default().with_parallel_threshold(64);
        let arena = build(items, &config).unwrap();
        assert_eq!(arena.live(), 5000);
        assert_eq!(arena.depth(), 5000);
    }

    #[test]
    fn seeded_builds_are_reproducible() {
        let config = IndexConfig::default().with_seed(7).with_parallel_threshold(16);
        let a = build(sample(200), &config).unwrap();
        let b = build(sample(200), &config).unwrap();
        let order_a: Vec<_> = a.iter().map(|n| n.vantage.clone()).collect();
        let order_b: Vec<_> = b.iter().map(|n| n.vantage.clone()).collect();
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn take_subtree_and_graft_preserve_members() {
        let mut arena = build(sample(50), &IndexConfig::default()).unwrap();
        let root = arena.detach(Slot::Root).unwrap();
        let members = arena.take_subtree(root);
        assert_eq!(members.len(), 50);
        assert_eq!(arena.live(), 0);

        let rebuilt = build(members, &IndexConfig::default()).unwrap();
        let new_root = arena.graft(rebuilt).unwrap();
        arena.attach(Slot::Root, new_root);
        assert_eq!(arena.live(), 50);
        assert_eq!(arena.slots(), 50, "grafted nodes reuse released slots");
        assert_partition_invariant(&arena);
    }
}
