use cv_core::nalgebra::{distance, Point2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A distance between two cluster centroids.
///
/// Implementations must be symmetric and non-negative. The clustering compares the returned
/// value against the configured `max_merge_distance`, so it has to be in the same unit.
pub trait Metric: Sync {
    fn distance(&self, a: &Point2<f64>, b: &Point2<f64>) -> f64;
}

/// City-block (L1) distance, the sum of absolute coordinate differences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CityBlock;

impl Metric for CityBlock {
    fn distance(&self, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
        (a - b).lp_norm(1)
    }
}

/// Straight-line (L2) distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Euclidean;

impl Metric for Euclidean {
    fn distance(&self, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
        distance(a, b)
    }
}

/// Chessboard (L∞) distance, the largest absolute coordinate difference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Chebyshev;

impl Metric for Chebyshev {
    fn distance(&self, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
        (a - b).amax()
    }
}
