use crate::{Error, ImageDimensions, KeyPoint, Result};
use log::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The number of chunk rows and columns the image plane is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChunkGrid {
    pub rows: usize,
    pub cols: usize,
}

impl ChunkGrid {
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        let grid = Self { rows, cols };
        grid.validate()?;
        Ok(grid)
    }

    /// Total number of chunks.
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "chunk grid must have at least one row and column, got {}x{}",
                self.rows, self.cols
            )));
        }
        Ok(())
    }
}

impl Default for ChunkGrid {
    fn default() -> Self {
        Self { rows: 4, cols: 4 }
    }
}

/// Position of a chunk in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChunkIndex {
    pub row: usize,
    pub col: usize,
}

/// Assigns every keypoint to exactly one chunk of a grid laid over the image.
///
/// Chunk extents are the image dimensions integer-divided by the grid dimensions. Whatever
/// remainder that leaves along the right and bottom edges belongs to the last column and row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    grid: ChunkGrid,
    chunk_width: u32,
    chunk_height: u32,
}

impl Partitioner {
    /// # Arguments
    /// * `dimensions` - Size of the image the keypoints were detected on.
    /// * `grid` - How many chunks to split it into along each axis.
    ///
    /// Fails if the grid is empty or has more chunks along an axis than the image has pixels.
    pub fn new(dimensions: ImageDimensions, grid: ChunkGrid) -> Result<Self> {
        grid.validate()?;
        let chunk_width = dimensions.width / u32::try_from(grid.cols).unwrap_or(u32::MAX);
        let chunk_height = dimensions.height / u32::try_from(grid.rows).unwrap_or(u32::MAX);
        if chunk_width == 0 || chunk_height == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "a {}x{} chunk grid does not fit a {}x{} image",
                grid.rows, grid.cols, dimensions.width, dimensions.height
            )));
        }
        debug!(
            "Partitioning {}x{} image into {}x{} chunks of {}x{} pixels",
            dimensions.width, dimensions.height, grid.rows, grid.cols, chunk_width, chunk_height
        );
        Ok(Self {
            grid,
            chunk_width,
            chunk_height,
        })
    }

    pub fn grid(&self) -> ChunkGrid {
        self.grid
    }

    /// Width and height of every chunk except the trailing ones.
    pub fn chunk_extent(&self) -> (u32, u32) {
        (self.chunk_width, self.chunk_height)
    }

    /// The chunk a point falls into. Points outside the image are clamped to the nearest
    /// border chunk.
    pub fn chunk_of(&self, (x, y): (i32, i32)) -> ChunkIndex {
        let clamp_axis = |coordinate: i32, extent: u32, count: usize| {
            let chunk = i64::from(coordinate).div_euclid(i64::from(extent));
            chunk.clamp(0, count as i64 - 1) as usize
        };
        ChunkIndex {
            row: clamp_axis(y, self.chunk_height, self.grid.rows),
            col: clamp_axis(x, self.chunk_width, self.grid.cols),
        }
    }

    /// The chunk stored at `flat` in the output of [`Partitioner::partition`].
    pub fn chunk_at(&self, flat: usize) -> ChunkIndex {
        ChunkIndex {
            row: flat / self.grid.cols,
            col: flat % self.grid.cols,
        }
    }

    /// Split `keypoints` into one bucket per chunk in row-major order.
    ///
    /// Every chunk gets a bucket, even when no keypoint falls into it. Keypoints keep their
    /// relative input order within a bucket.
    pub fn partition<M: Clone>(&self, keypoints: &[KeyPoint<M>]) -> Vec<Vec<KeyPoint<M>>> {
        let mut buckets = vec![vec![]; self.grid.len()];
        for keypoint in keypoints {
            let ChunkIndex { row, col } = self.chunk_of(keypoint.point);
            buckets[row * self.grid.cols + col].push(keypoint.clone());
        }
        buckets
    }
}
