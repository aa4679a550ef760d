use crate::ClusterId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One merge event: `left` and `right` were consumed to produce the cluster whose id indexes
/// this row.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MergeRow {
    pub left: ClusterId,
    pub right: ClusterId,
    /// Distance between the two children at the moment they were merged.
    pub distance: f64,
    /// Number of original keypoints in the merged cluster.
    pub size: usize,
}

/// The linkage record of a clustering run.
///
/// Rows are indexed by cluster id and the table is sized for the worst case of
/// `2 * n - 1` clusters for `n` keypoints. Ids of original singletons have no row.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MergeLog {
    rows: Vec<Option<MergeRow>>,
    order: Vec<ClusterId>,
}

impl MergeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the worst-case table for `num_keypoints` singletons.
    pub fn with_capacity(num_keypoints: usize) -> Self {
        Self {
            rows: vec![None; (2 * num_keypoints).saturating_sub(1)],
            order: Vec::with_capacity(num_keypoints.saturating_sub(1)),
        }
    }

    pub(crate) fn record(&mut self, id: ClusterId, row: MergeRow) {
        if id.0 >= self.rows.len() {
            self.rows.resize(id.0 + 1, None);
        }
        debug_assert!(self.rows[id.0].is_none(), "cluster ids are never reused");
        self.rows[id.0] = Some(row);
        self.order.push(id);
    }

    /// The merge that produced `id`, or `None` for singletons and unallocated ids.
    pub fn row(&self, id: ClusterId) -> Option<&MergeRow> {
        self.rows.get(id.0).and_then(Option::as_ref)
    }

    /// Number of rows the table has room for.
    pub fn capacity(&self) -> usize {
        self.rows.len()
    }

    /// Number of merges recorded.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate over the recorded merges in the order they happened.
    pub fn merges(&self) -> impl Iterator<Item = (ClusterId, &MergeRow)> + '_ {
        self.order
            .iter()
            .filter_map(move |&id| Some((id, self.row(id)?)))
    }

    /// The singleton ids folded into `id`, recovered from the log alone.
    ///
    /// An id without a row is its own only leaf.
    pub fn leaves(&self, id: ClusterId) -> Vec<ClusterId> {
        let mut leaves = vec![];
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            match self.row(id) {
                Some(row) => {
                    // Right first so that leaves come out left to right.
                    stack.push(row.right);
                    stack.push(row.left);
                }
                None => leaves.push(id),
            }
        }
        leaves
    }

    /// Dense `[left, right, distance, size]` rows in merge order.
    ///
    /// This is the layout commonly used to draw a dendrogram.
    pub fn to_linkage(&self) -> Vec<[f64; 4]> {
        self.merges()
            .map(|(_, row)| {
                [
                    row.left.0 as f64,
                    row.right.0 as f64,
                    row.distance,
                    row.size as f64,
                ]
            })
            .collect()
    }
}
