use crate::{Error, Euclidean, KeyPoint, Metric, Result};
use cv_core::ImagePoint;
use float_ord::FloatOrd;
use log::*;
use std::cmp::Reverse;

/// Keep only the strongest keypoint in every neighborhood of `radius` pixels.
///
/// Keypoints are visited from the highest to the lowest score. A keypoint is kept unless an
/// already kept keypoint lies within `radius` (Euclidean, inclusive) of it. Keypoints with
/// equal scores are visited in input order.
///
/// Unlike clustering, this never moves a keypoint; it only discards the weaker ones.
///
/// # Arguments
/// * `keypoints` - The keypoints to thin out.
/// * `score` - The detector response of a keypoint. Higher is stronger.
/// * `radius` - The suppression radius in pixels.
pub fn suppress_non_maxima<M, F>(
    keypoints: &[KeyPoint<M>],
    score: F,
    radius: f64,
) -> Result<Vec<KeyPoint<M>>>
where
    M: Clone,
    F: Fn(&KeyPoint<M>) -> f32,
{
    if radius.is_nan() || radius < 0.0 {
        return Err(Error::InvalidConfiguration(format!(
            "suppression radius must be non-negative, got {radius}"
        )));
    }
    let mut candidates: Vec<&KeyPoint<M>> = keypoints.iter().collect();
    candidates.sort_by_cached_key(|&keypoint| Reverse(FloatOrd(score(keypoint))));

    let mut kept: Vec<&KeyPoint<M>> = vec![];
    for candidate in candidates {
        let point = candidate.image_point();
        if kept
            .iter()
            .all(|strong| Euclidean.distance(&strong.image_point(), &point) > radius)
        {
            kept.push(candidate);
        }
    }
    debug!(
        "{}/{} keypoints remain after non-maximum suppression",
        kept.len(),
        keypoints.len()
    );
    Ok(kept.into_iter().cloned().collect())
}
