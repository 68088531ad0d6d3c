//! In-memory reference graph over a point-in-time edge snapshot.

use std::collections::{HashMap, HashSet, VecDeque};

/// Directed reference graph between NAR ids.
///
/// Self-edges are dropped at construction; they carry no reachability
/// information and would otherwise keep their owner alive forever.
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    edges: HashMap<i64, Vec<i64>>,
}

impl ReferenceGraph {
    /// Build a graph from `(nar_id, ref_id)` edge pairs.
    pub fn from_edges(pairs: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let mut edges: HashMap<i64, Vec<i64>> = HashMap::new();
        for (nar_id, ref_id) in pairs {
            if nar_id == ref_id {
                continue;
            }
            edges.entry(nar_id).or_default().push(ref_id);
        }
        Self { edges }
    }

    /// Outgoing references of one node.
    pub fn references_of(&self, nar_id: i64) -> &[i64] {
        self.edges.get(&nar_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The set of nodes reachable from `roots`, the roots themselves
    /// included. Cycles terminate through the visited set.
    pub fn closure_of(&self, roots: impl IntoIterator<Item = i64>) -> HashSet<i64> {
        let mut visited: HashSet<i64> = HashSet::new();
        let mut queue: VecDeque<i64> = VecDeque::new();
        for root in roots {
            if visited.insert(root) {
                queue.push_back(root);
            }
        }
        while let Some(id) = queue.pop_front() {
            for &next in self.references_of(id) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        visited
    }
}
