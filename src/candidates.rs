use crate::{ClusterId, ClusterStore, Metric, Result};
use float_ord::FloatOrd;
use std::cmp::Reverse;

/// A pending merge between two active clusters.
///
/// The ids are stored with `a < b` so that an edge has exactly one representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub distance: f64,
    pub a: ClusterId,
    pub b: ClusterId,
}

impl Edge {
    pub fn new(distance: f64, a: ClusterId, b: ClusterId) -> Self {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        Self { distance, a, b }
    }

    pub fn touches(&self, id: ClusterId) -> bool {
        self.a == id || self.b == id
    }

    /// Edges pop in ascending order of this key. Equal distances fall back to
    /// the lower ids, which keeps runs reproducible.
    fn key(&self) -> (FloatOrd<f64>, ClusterId, ClusterId) {
        (FloatOrd(self.distance), self.a, self.b)
    }
}

/// Every pair of active clusters within the merge threshold.
///
/// Edges are kept sorted in descending order so the minimum sits at the end of the vector and
/// pops in O(1). Insertions only append; the vector is re-sorted lazily before the next pop.
/// Since the existing edges already form one sorted run, that sort is close to linear.
#[derive(Debug, Clone, Default)]
pub struct CandidateIndex {
    edges: Vec<Edge>,
    dirty: bool,
}

impl CandidateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, edge: Edge) {
        self.edges.push(edge);
        self.dirty = true;
    }

    /// Add an edge from `new_id` to every other active cluster in `store` that lies within
    /// `max_distance`. Returns how many edges were added.
    ///
    /// # Arguments
    /// * `store` - The store holding `new_id` and the currently active clusters.
    /// * `new_id` - The freshly created cluster.
    /// * `metric` - The inter-cluster distance.
    /// * `max_distance` - Pairs further apart than this are left out.
    pub fn seed<D: Metric>(
        &mut self,
        store: &ClusterStore,
        new_id: ClusterId,
        metric: &D,
        max_distance: f64,
    ) -> Result<usize> {
        let centroid = store.get(new_id)?.centroid;
        let before = self.edges.len();
        for other in store.active_clusters().filter(|other| other.id != new_id) {
            let distance = metric.distance(&other.centroid, &centroid);
            if distance <= max_distance {
                self.insert(Edge::new(distance, other.id, new_id));
            }
        }
        Ok(self.edges.len() - before)
    }

    /// Restore the sort order after insertions.
    ///
    /// [`CandidateIndex::pop_min`] does this on its own; calling it directly is only useful to
    /// pay the cost up front, e.g. after seeding a whole batch of singletons.
    pub fn sort(&mut self) {
        if self.dirty {
            self.edges.sort_by_key(|edge| Reverse(edge.key()));
            self.dirty = false;
        }
    }

    /// Remove and return the shortest edge.
    pub fn pop_min(&mut self) -> Option<Edge> {
        self.sort();
        self.edges.pop()
    }

    /// Drop every edge that references one of `retired`. Returns how many were dropped.
    ///
    /// This must happen no later than the moment those clusters stop being active, otherwise
    /// a stale edge could be popped.
    pub fn purge(&mut self, retired: &[ClusterId]) -> usize {
        let before = self.edges.len();
        self.edges
            .retain(|edge| !retired.iter().any(|&id| edge.touches(id)));
        before - self.edges.len()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// All edges, in no particular order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CityBlock, KeyPoint};

    fn id(n: usize) -> ClusterId {
        ClusterId(n)
    }

    #[test]
    fn pops_in_ascending_distance() {
        let mut index = CandidateIndex::new();
        index.insert(Edge::new(3.0, id(0), id(1)));
        index.insert(Edge::new(1.0, id(2), id(3)));
        index.insert(Edge::new(2.0, id(4), id(5)));
        let order: Vec<f64> = std::iter::from_fn(|| index.pop_min())
            .map(|edge| edge.distance)
            .collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0]);
        assert!(index.pop_min().is_none());
    }

    #[test]
    fn ties_break_towards_lower_ids() {
        let mut index = CandidateIndex::new();
        index.insert(Edge::new(1.0, id(7), id(2)));
        index.insert(Edge::new(1.0, id(3), id(1)));
        index.insert(Edge::new(1.0, id(1), id(2)));
        assert_eq!(index.pop_min(), Some(Edge::new(1.0, id(1), id(2))));
        assert_eq!(index.pop_min(), Some(Edge::new(1.0, id(1), id(3))));
        assert_eq!(index.pop_min(), Some(Edge::new(1.0, id(2), id(7))));
    }

    #[test]
    fn insert_after_pop_keeps_order() {
        let mut index = CandidateIndex::new();
        index.insert(Edge::new(5.0, id(0), id(1)));
        index.insert(Edge::new(4.0, id(0), id(2)));
        assert_eq!(index.pop_min().unwrap().distance, 4.0);
        index.insert(Edge::new(0.5, id(3), id(4)));
        assert_eq!(index.pop_min().unwrap().distance, 0.5);
        assert_eq!(index.pop_min().unwrap().distance, 5.0);
    }

    #[test]
    fn purge_removes_every_reference() {
        let mut index = CandidateIndex::new();
        index.insert(Edge::new(1.0, id(0), id(1)));
        index.insert(Edge::new(2.0, id(1), id(2)));
        index.insert(Edge::new(3.0, id(2), id(3)));
        index.insert(Edge::new(4.0, id(0), id(3)));
        assert_eq!(index.purge(&[id(0), id(1)]), 3);
        assert_eq!(index.edges(), &[Edge::new(3.0, id(2), id(3))]);
    }

    #[test]
    fn seed_respects_threshold_and_skips_itself() {
        let mut store = ClusterStore::new();
        for point in [(0, 0), (3, 0), (10, 0)] {
            store.create_singleton(&KeyPoint::from(point));
        }
        let mut index = CandidateIndex::new();
        let newest = store.create_singleton(&KeyPoint::from((1, 0)));
        assert_eq!(index.seed(&store, newest, &CityBlock, 2.0).unwrap(), 2);
        assert_eq!(index.pop_min(), Some(Edge::new(1.0, id(0), newest)));
        assert_eq!(index.pop_min(), Some(Edge::new(2.0, id(1), newest)));
        assert!(index.is_empty());
    }

    #[test]
    fn seed_ignores_retired_clusters() {
        let mut store = ClusterStore::new();
        for point in [(0, 0), (1, 0), (2, 0)] {
            store.create_singleton(&KeyPoint::from(point));
        }
        let merged = store.merge(id(0), id(1), 1.0).unwrap();
        let mut index = CandidateIndex::new();
        index.seed(&store, merged, &CityBlock, 10.0).unwrap();
        assert_eq!(index.edges(), &[Edge::new(1.5, id(2), merged)]);
    }
}
