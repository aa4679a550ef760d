use crate::{
    CancelToken, CandidateIndex, ClusterId, ClusterStore, Error, HierarchicalClustering, KeyPoint,
    MergeLog, Metric, Result,
};
use cv_core::nalgebra::Point2;
use log::*;

/// Whether a [`MergeLoop`] can still merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// At least two clusters are active and a candidate edge remains.
    Running,
    /// One cluster is left or no pair lies within the threshold any more.
    Terminated,
}

/// A merge performed by [`MergeLoop::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: ClusterId,
    pub right: ClusterId,
    pub merged: ClusterId,
    pub distance: f64,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Merged(Merge),
    Terminated,
}

/// The outcome of one clustering run, one entry per surviving cluster.
///
/// All vectors are parallel and ordered by increasing cluster id.
#[derive(Debug, Clone, PartialEq)]
pub struct Clusters<M> {
    /// One representative per cluster: the first member with its point moved to the rounded
    /// centroid.
    pub keypoints: Vec<KeyPoint<M>>,
    /// Number of input keypoints in each cluster.
    pub sizes: Vec<usize>,
    /// The exact centroids before rounding.
    pub centroids: Vec<Point2<f64>>,
    /// Indices into the input slice of the keypoints belonging to each cluster.
    pub members: Vec<Vec<usize>>,
    pub merge_log: MergeLog,
}

impl<M> Clusters<M> {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Round a centroid to the nearest pixel. Halves round away from zero.
pub(crate) fn round_centroid(centroid: &Point2<f64>) -> (i32, i32) {
    (centroid.x.round() as i32, centroid.y.round() as i32)
}

impl<D: Metric> HierarchicalClustering<D> {
    /// Cluster `keypoints` until no two clusters are within the merge threshold.
    ///
    /// # Arguments
    /// * `keypoints` - The keypoints to cluster. An empty slice yields an empty result.
    ///
    /// Returns one representative keypoint per surviving cluster along with the merge log.
    pub fn cluster<M: Clone>(&self, keypoints: &[KeyPoint<M>]) -> Result<Clusters<M>> {
        self.cluster_with_cancel(keypoints, &CancelToken::new())
    }

    /// Same as [`HierarchicalClustering::cluster`], but gives up with [`Error::Cancelled`]
    /// once `cancel` is triggered.
    pub fn cluster_with_cancel<M: Clone>(
        &self,
        keypoints: &[KeyPoint<M>],
        cancel: &CancelToken,
    ) -> Result<Clusters<M>> {
        let clusters = self.start(keypoints)?.with_cancel(cancel.clone()).run()?;
        info!(
            "Clustered {} keypoints into {} clusters",
            keypoints.len(),
            clusters.len()
        );
        Ok(clusters)
    }

    /// Create a singleton per keypoint and seed all candidate edges, without merging anything
    /// yet. Use this to drive the merge loop one step at a time.
    pub fn start<'a, M>(&'a self, keypoints: &'a [KeyPoint<M>]) -> Result<MergeLoop<'a, M, D>> {
        MergeLoop::new(self, keypoints)
    }
}

/// The agglomerative merge loop over one set of keypoints.
///
/// Each step pops the shortest candidate edge, retires both of its clusters, and seeds edges
/// from the merged cluster to the remaining active ones. The loop terminates when the candidate
/// index runs dry, which, since the index holds every active pair within the threshold, is
/// exactly when no such pair is left.
#[derive(Debug)]
pub struct MergeLoop<'a, M, D> {
    config: &'a HierarchicalClustering<D>,
    keypoints: &'a [KeyPoint<M>],
    store: ClusterStore,
    index: CandidateIndex,
    cancel: Option<CancelToken>,
    state: State,
}

impl<'a, M, D: Metric> MergeLoop<'a, M, D> {
    fn new(config: &'a HierarchicalClustering<D>, keypoints: &'a [KeyPoint<M>]) -> Result<Self> {
        let mut store = ClusterStore::with_capacity(keypoints.len());
        let mut index = CandidateIndex::new();
        for keypoint in keypoints {
            let id = store.create_singleton(keypoint);
            index.seed(&store, id, &config.metric, config.max_merge_distance)?;
        }
        index.sort();
        debug!(
            "Seeded {} candidate edges between {} keypoints within distance {}",
            index.len(),
            keypoints.len(),
            config.max_merge_distance
        );
        let mut merge_loop = Self {
            config,
            keypoints,
            store,
            index,
            cancel: None,
            state: State::Running,
        };
        merge_loop.update_state();
        Ok(merge_loop)
    }

    /// Check `cancel` before every merge.
    #[must_use]
    pub fn with_cancel(self, cancel: CancelToken) -> Self {
        Self {
            cancel: Some(cancel),
            ..self
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn store(&self) -> &ClusterStore {
        &self.store
    }

    pub fn candidates(&self) -> &CandidateIndex {
        &self.index
    }

    /// Perform a single merge, or report that the loop has terminated.
    pub fn step(&mut self) -> Result<Step> {
        if self.state == State::Terminated {
            return Ok(Step::Terminated);
        }
        if self.cancel.as_ref().map_or(false, CancelToken::is_cancelled) {
            return Err(Error::Cancelled);
        }
        let Some(edge) = self.index.pop_min() else {
            self.state = State::Terminated;
            return Ok(Step::Terminated);
        };
        self.index.purge(&[edge.a, edge.b]);
        let merged = self.store.merge(edge.a, edge.b, edge.distance)?;
        let seeded = self.index.seed(
            &self.store,
            merged,
            &self.config.metric,
            self.config.max_merge_distance,
        )?;
        let size = self.store.get(merged)?.size;
        trace!(
            "Merged {} and {} into {} (distance {}, size {}), {} new edges, {} pending",
            edge.a,
            edge.b,
            merged,
            edge.distance,
            size,
            seeded,
            self.index.len()
        );
        self.update_state();
        Ok(Step::Merged(Merge {
            left: edge.a,
            right: edge.b,
            merged,
            distance: edge.distance,
            size,
        }))
    }

    fn update_state(&mut self) {
        if self.store.active_len() <= 1 || self.index.is_empty() {
            self.state = State::Terminated;
        }
    }
}

impl<'a, M: Clone, D: Metric> MergeLoop<'a, M, D> {
    /// Merge until terminated and emit the result.
    pub fn run(mut self) -> Result<Clusters<M>> {
        while let Step::Merged(_) = self.step()? {}
        debug!(
            "Merge loop terminated after {} merges with {} active clusters",
            self.store.merge_log().len(),
            self.store.active_len()
        );
        Ok(self.finish())
    }

    /// Emit one representative keypoint per currently active cluster.
    ///
    /// Calling this before the loop has terminated returns the partial clustering.
    pub fn finish(self) -> Clusters<M> {
        let count = self.store.active_len();
        let mut clusters = Clusters {
            keypoints: Vec::with_capacity(count),
            sizes: Vec::with_capacity(count),
            centroids: Vec::with_capacity(count),
            members: Vec::with_capacity(count),
            merge_log: MergeLog::new(),
        };
        for cluster in self.store.active_clusters() {
            let reference = &self.keypoints[cluster.members[0]];
            clusters.keypoints.push(KeyPoint {
                point: round_centroid(&cluster.centroid),
                meta: reference.meta.clone(),
            });
            clusters.sizes.push(cluster.size);
            clusters.centroids.push(cluster.centroid);
            clusters.members.push(cluster.members.clone());
        }
        clusters.merge_log = self.store.into_merge_log();
        clusters
    }
}
