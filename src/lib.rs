//! # kpcluster
//!
//! Corner detectors fire many times around a single physical feature. This crate reduces such a
//! dense set of keypoints to a smaller set of representative points by agglomerative clustering:
//! every keypoint starts as its own cluster, and the two closest clusters are merged repeatedly
//! until no pair of clusters lies within `max_merge_distance` of each other. Each surviving
//! cluster is emitted as one keypoint at its (rounded) centroid.
//!
//! Only pairs closer than the threshold are ever considered, which turns an all-pairs problem
//! into a sparse one. For large keypoint counts the image plane can additionally be split into a
//! grid of chunks that are clustered independently, see [`ChunkedClustering`].
//!
//! ```
//! use kpcluster::{HierarchicalClustering, KeyPoint};
//!
//! let keypoints = [(0, 0), (0, 1), (0, 2), (100, 100)].map(KeyPoint::from);
//! let clusters = HierarchicalClustering::new(3.0).unwrap().cluster(&keypoints).unwrap();
//! assert_eq!(clusters.keypoints.len(), 2);
//! assert_eq!(clusters.sizes, vec![1, 3]);
//! ```

mod cancel;
mod candidates;
mod engine;
mod error;
mod merge_log;
mod metric;
mod nms;
mod partition;
mod runner;
mod store;

pub use cancel::CancelToken;
pub use candidates::{CandidateIndex, Edge};
pub use engine::{Clusters, Merge, MergeLoop, State, Step};
pub use error::{Error, Result};
pub use merge_log::{MergeLog, MergeRow};
pub use metric::{Chebyshev, CityBlock, Euclidean, Metric};
pub use nms::suppress_non_maxima;
pub use partition::{ChunkGrid, ChunkIndex, Partitioner};
pub use runner::{ChunkRun, ChunkedClusters, ChunkedClustering};
pub use store::{Cluster, ClusterId, ClusterStore};

use cv_core::nalgebra::Point2;
use cv_core::ImagePoint;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A detected point of interest in an image.
///
/// The clustering only ever reads `point`. Everything else a caller needs in order to
/// reconstruct a keypoint (source image, descriptor parameters, detector score) lives in `meta`
/// and is carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyPoint<M = ()> {
    /// Pixel coordinate as `(x, y)`.
    /// +x faces right and +y faces toward the bottom of the image,
    /// both starting from the top left corner.
    pub point: (i32, i32),
    /// Opaque payload copied onto representative keypoints.
    pub meta: M,
}

impl<M> KeyPoint<M> {
    pub fn new(x: i32, y: i32, meta: M) -> Self {
        Self {
            point: (x, y),
            meta,
        }
    }

    pub fn x(&self) -> i32 {
        self.point.0
    }

    pub fn y(&self) -> i32 {
        self.point.1
    }
}

impl From<(i32, i32)> for KeyPoint {
    fn from(point: (i32, i32)) -> Self {
        Self { point, meta: () }
    }
}

impl<M> ImagePoint for KeyPoint<M> {
    fn image_point(&self) -> Point2<f64> {
        Point2::new(f64::from(self.point.0), f64::from(self.point.1))
    }
}

/// Width and height of the image the keypoints were detected on, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Contains the configuration of a single clustering run.
///
/// The important parameter is `max_merge_distance`: two clusters whose centroids are further
/// apart than this (under `metric`) are never merged. [`HierarchicalClustering::new`] sets the
/// threshold and keeps the default [`CityBlock`] metric. The default threshold is `25.0`.
///
/// The threshold is an absolute pixel distance. It does not scale with the image resolution, so
/// callers working with very large or very small images should pick it accordingly.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HierarchicalClustering<D = CityBlock> {
    max_merge_distance: f64,
    metric: D,
}

impl HierarchicalClustering {
    /// This convenience constructor is provided for the common case where only
    /// the threshold needs to change.
    ///
    /// Fails with [`Error::InvalidConfiguration`] if the threshold is negative or NaN.
    pub fn new(max_merge_distance: f64) -> Result<Self> {
        Self::with_metric(max_merge_distance, CityBlock)
    }
}

impl<D: Metric> HierarchicalClustering<D> {
    /// Create a clustering configuration with a custom inter-cluster distance.
    ///
    /// An infinite threshold is allowed and yields a full hierarchy (everything
    /// merges into one cluster).
    pub fn with_metric(max_merge_distance: f64, metric: D) -> Result<Self> {
        if max_merge_distance.is_nan() || max_merge_distance < 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "max_merge_distance must be non-negative, got {max_merge_distance}"
            )));
        }
        Ok(Self {
            max_merge_distance,
            metric,
        })
    }

    pub fn max_merge_distance(&self) -> f64 {
        self.max_merge_distance
    }

    pub fn metric(&self) -> &D {
        &self.metric
    }
}

impl Default for HierarchicalClustering {
    fn default() -> Self {
        Self {
            max_merge_distance: 25.0,
            metric: CityBlock,
        }
    }
}
