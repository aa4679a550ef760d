use crate::{Error, KeyPoint, MergeLog, MergeRow, Result};
use cv_core::nalgebra::Point2;
use cv_core::ImagePoint;
use derive_more::{Display, From, Into};
use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifies a cluster within one [`ClusterStore`].
///
/// Ids are handed out in increasing order and never reused, so a larger id was always created
/// later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    /// Number of original keypoints folded into this cluster.
    pub size: usize,
    /// Weighted mean of the member coordinates. Never rounded.
    pub centroid: Point2<f64>,
    /// Indices of the member keypoints in increasing order, so the first one is the
    /// earliest inserted.
    pub members: Vec<usize>,
}

/// Append-only arena of clusters.
///
/// Consumed clusters stay readable so that the lineage of any cluster can be inspected; only
/// the active set shrinks.
#[derive(Debug, Clone, Default)]
pub struct ClusterStore {
    clusters: Vec<Cluster>,
    active: BTreeSet<ClusterId>,
    num_keypoints: usize,
    merge_log: MergeLog,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preallocate for a run over `num_keypoints` keypoints.
    pub fn with_capacity(num_keypoints: usize) -> Self {
        Self {
            clusters: Vec::with_capacity((2 * num_keypoints).saturating_sub(1)),
            active: BTreeSet::new(),
            num_keypoints: 0,
            merge_log: MergeLog::with_capacity(num_keypoints),
        }
    }

    /// Add a cluster holding only `keypoint`. The keypoint is recorded as member number
    /// `n` where `n` is the number of singletons created before it.
    pub fn create_singleton<M>(&mut self, keypoint: &KeyPoint<M>) -> ClusterId {
        let member = self.num_keypoints;
        self.num_keypoints += 1;
        self.allocate(1, keypoint.image_point(), vec![member])
    }

    /// Consume `a` and `b` and create the cluster that combines them.
    ///
    /// The new centroid is the size-weighted mean of both centroids. The merge is recorded
    /// in the merge log under the new id together with `distance`.
    pub fn merge(&mut self, a: ClusterId, b: ClusterId, distance: f64) -> Result<ClusterId> {
        let (size_a, centroid_a) = self.get(a).map(|c| (c.size, c.centroid))?;
        let (size_b, centroid_b) = self.get(b).map(|c| (c.size, c.centroid))?;
        if !self.active.remove(&a) {
            return Err(Error::Retired(a));
        }
        if !self.active.remove(&b) {
            self.active.insert(a);
            return Err(Error::Retired(b));
        }

        let size = size_a + size_b;
        let centroid = Point2::from(
            (centroid_a.coords * size_a as f64 + centroid_b.coords * size_b as f64) / size as f64,
        );
        let mut members = Vec::with_capacity(size);
        members.extend_from_slice(&self.clusters[a.0].members);
        members.extend_from_slice(&self.clusters[b.0].members);
        members.sort_unstable();

        let id = self.allocate(size, centroid, members);
        self.merge_log.record(
            id,
            MergeRow {
                left: a,
                right: b,
                distance,
                size,
            },
        );
        Ok(id)
    }

    /// Look up any cluster ever allocated, consumed or not.
    pub fn get(&self, id: ClusterId) -> Result<&Cluster> {
        self.clusters.get(id.0).ok_or(Error::NotFound(id))
    }

    pub fn is_active(&self, id: ClusterId) -> bool {
        self.active.contains(&id)
    }

    /// Ids of the clusters not yet consumed, in increasing order.
    pub fn active(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.active.iter().copied()
    }

    /// The clusters not yet consumed, in increasing id order.
    pub fn active_clusters(&self) -> impl Iterator<Item = &Cluster> + '_ {
        self.active.iter().map(move |id| &self.clusters[id.0])
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Number of clusters ever allocated.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn merge_log(&self) -> &MergeLog {
        &self.merge_log
    }

    pub fn into_merge_log(self) -> MergeLog {
        self.merge_log
    }

    fn allocate(&mut self, size: usize, centroid: Point2<f64>, members: Vec<usize>) -> ClusterId {
        let id = ClusterId(self.clusters.len());
        self.clusters.push(Cluster {
            id,
            size,
            centroid,
            members,
        });
        self.active.insert(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(points: &[(i32, i32)]) -> ClusterStore {
        let mut store = ClusterStore::with_capacity(points.len());
        for &point in points {
            store.create_singleton(&KeyPoint::from(point));
        }
        store
    }

    #[test]
    fn singletons_get_sequential_ids() {
        let store = store_with(&[(4, 5), (6, 7)]);
        let first = store.get(ClusterId(0)).unwrap();
        assert_eq!(first.size, 1);
        assert_eq!(first.centroid, Point2::new(4.0, 5.0));
        assert_eq!(first.members, vec![0]);
        assert_eq!(store.get(ClusterId(1)).unwrap().members, vec![1]);
        assert_eq!(store.active_len(), 2);
    }

    #[test]
    fn merge_weights_centroid_by_size() {
        let mut store = store_with(&[(0, 0), (2, 0), (9, 3)]);
        let pair = store.merge(ClusterId(0), ClusterId(1), 2.0).unwrap();
        assert_eq!(pair, ClusterId(3));
        assert_eq!(store.get(pair).unwrap().centroid, Point2::new(1.0, 0.0));

        let all = store.merge(pair, ClusterId(2), 11.0).unwrap();
        let cluster = store.get(all).unwrap();
        assert_eq!(cluster.size, 3);
        assert_eq!(cluster.centroid, Point2::new(11.0 / 3.0, 1.0));
        assert_eq!(cluster.members, vec![0, 1, 2]);
        assert_eq!(store.active().collect::<Vec<_>>(), vec![all]);

        let row = store.merge_log().row(all).unwrap();
        assert_eq!((row.left, row.right, row.distance, row.size), (pair, ClusterId(2), 11.0, 3));
    }

    #[test]
    fn centroid_is_not_truncated() {
        let mut store = store_with(&[(0, 0), (1, 1)]);
        let id = store.merge(ClusterId(0), ClusterId(1), 2.0).unwrap();
        assert_eq!(store.get(id).unwrap().centroid, Point2::new(0.5, 0.5));
    }

    #[test]
    fn retired_clusters_stay_readable() {
        let mut store = store_with(&[(0, 0), (1, 0)]);
        store.merge(ClusterId(0), ClusterId(1), 1.0).unwrap();
        assert!(!store.is_active(ClusterId(0)));
        assert_eq!(store.get(ClusterId(0)).unwrap().centroid, Point2::new(0.0, 0.0));
    }

    #[test]
    fn unknown_and_retired_ids_are_rejected() {
        let mut store = store_with(&[(0, 0), (1, 0), (2, 0)]);
        assert_eq!(store.get(ClusterId(9)), Err(Error::NotFound(ClusterId(9))));
        store.merge(ClusterId(0), ClusterId(1), 1.0).unwrap();
        assert_eq!(
            store.merge(ClusterId(2), ClusterId(0), 2.0),
            Err(Error::Retired(ClusterId(0)))
        );
        // A failed merge leaves the active set untouched.
        assert!(store.is_active(ClusterId(2)));
        assert_eq!(
            store.merge(ClusterId(2), ClusterId(2), 0.0),
            Err(Error::Retired(ClusterId(2)))
        );
        assert!(store.is_active(ClusterId(2)));
    }
}
