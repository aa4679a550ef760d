use crate::{
    CancelToken, ChunkGrid, ChunkIndex, CityBlock, Clusters, Error, HierarchicalClustering,
    ImageDimensions, KeyPoint, MergeLog, Metric, Partitioner, Result,
};
use log::*;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "rayon")]
use rayon::ThreadPool;

/// Clusters keypoints chunk by chunk.
///
/// The image plane is split with a [`Partitioner`] and every non-empty chunk is clustered on its
/// own. No candidate edge ever crosses a chunk border, so two close keypoints on either side of a
/// border stay separate. In exchange, chunks are independent and can run on a worker pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkedClustering<D = CityBlock> {
    clustering: HierarchicalClustering<D>,
    grid: ChunkGrid,
    chunks_per_worker: usize,
}

/// The merge log of one chunk. Ids in it are local to that chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRun {
    pub chunk: ChunkIndex,
    pub merge_log: MergeLog,
}

/// Concatenated output of all chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkedClusters<M> {
    pub keypoints: Vec<KeyPoint<M>>,
    pub sizes: Vec<usize>,
    /// One entry per non-empty chunk in row-major order.
    pub chunks: Vec<ChunkRun>,
}

impl<M> ChunkedClusters<M> {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    fn assemble(results: impl IntoIterator<Item = (ChunkIndex, Clusters<M>)>) -> Self {
        let mut output = Self {
            keypoints: vec![],
            sizes: vec![],
            chunks: vec![],
        };
        for (chunk, clusters) in results {
            output.keypoints.extend(clusters.keypoints);
            output.sizes.extend(clusters.sizes);
            output.chunks.push(ChunkRun {
                chunk,
                merge_log: clusters.merge_log,
            });
        }
        output
    }
}

impl ChunkedClustering {
    /// Chunked clustering with the default [`CityBlock`] metric.
    pub fn new(max_merge_distance: f64, grid: ChunkGrid) -> Result<Self> {
        Self::with_clustering(HierarchicalClustering::new(max_merge_distance)?, grid, 2)
    }
}

impl<D: Metric> ChunkedClustering<D> {
    /// # Arguments
    /// * `clustering` - The configuration every chunk is clustered with.
    /// * `grid` - How to split the image.
    /// * `chunks_per_worker` - How many chunks a worker takes at once when running on a pool.
    pub fn with_clustering(
        clustering: HierarchicalClustering<D>,
        grid: ChunkGrid,
        chunks_per_worker: usize,
    ) -> Result<Self> {
        grid.validate()?;
        if chunks_per_worker == 0 {
            return Err(Error::InvalidConfiguration(
                "chunks_per_worker must be at least 1".into(),
            ));
        }
        Ok(Self {
            clustering,
            grid,
            chunks_per_worker,
        })
    }

    pub fn clustering(&self) -> &HierarchicalClustering<D> {
        &self.clustering
    }

    pub fn grid(&self) -> ChunkGrid {
        self.grid
    }

    pub fn chunks_per_worker(&self) -> usize {
        self.chunks_per_worker
    }

    /// Cluster every chunk one after the other on the calling thread.
    pub fn run<M: Clone>(
        &self,
        dimensions: ImageDimensions,
        keypoints: &[KeyPoint<M>],
    ) -> Result<ChunkedClusters<M>> {
        self.run_with_cancel(dimensions, keypoints, &CancelToken::new())
    }

    pub fn run_with_cancel<M: Clone>(
        &self,
        dimensions: ImageDimensions,
        keypoints: &[KeyPoint<M>],
        cancel: &CancelToken,
    ) -> Result<ChunkedClusters<M>> {
        if keypoints.is_empty() {
            return Ok(ChunkedClusters::assemble(Vec::new()));
        }
        let partitioner = Partitioner::new(dimensions, self.grid)?;
        let buckets = partitioner.partition(keypoints);
        let results = buckets
            .iter()
            .enumerate()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(flat, bucket)| self.cluster_chunk(partitioner.chunk_at(flat), bucket, cancel))
            .collect::<Result<Vec<_>>>()?;
        let output = ChunkedClusters::assemble(results);
        info!(
            "Clustered {} keypoints into {} clusters over {} chunks",
            keypoints.len(),
            output.len(),
            output.chunks.len()
        );
        Ok(output)
    }

    /// Cluster the chunks on `pool`, handing out `chunks_per_worker` chunks per task.
    ///
    /// The first chunk to fail fails the whole run. The output is identical to
    /// [`ChunkedClustering::run`].
    #[cfg(feature = "rayon")]
    pub fn run_in<M: Clone + Send + Sync>(
        &self,
        pool: &ThreadPool,
        dimensions: ImageDimensions,
        keypoints: &[KeyPoint<M>],
    ) -> Result<ChunkedClusters<M>> {
        self.run_in_with_cancel(pool, dimensions, keypoints, &CancelToken::new())
    }

    #[cfg(feature = "rayon")]
    pub fn run_in_with_cancel<M: Clone + Send + Sync>(
        &self,
        pool: &ThreadPool,
        dimensions: ImageDimensions,
        keypoints: &[KeyPoint<M>],
        cancel: &CancelToken,
    ) -> Result<ChunkedClusters<M>> {
        if keypoints.is_empty() {
            return Ok(ChunkedClusters::assemble(Vec::new()));
        }
        let partitioner = Partitioner::new(dimensions, self.grid)?;
        let buckets = partitioner.partition(keypoints);
        debug!(
            "Running {} chunks on {} threads, {} chunks per task",
            buckets.len(),
            pool.current_num_threads(),
            self.chunks_per_worker
        );
        let batches = pool.install(|| {
            buckets
                .par_chunks(self.chunks_per_worker)
                .enumerate()
                .map(|(batch, bucket_batch)| {
                    let first = batch * self.chunks_per_worker;
                    bucket_batch
                        .iter()
                        .enumerate()
                        .filter(|(_, bucket)| !bucket.is_empty())
                        .map(|(offset, bucket)| {
                            let chunk = partitioner.chunk_at(first + offset);
                            self.cluster_chunk(chunk, bucket, cancel)
                        })
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<Vec<_>>>()
        })?;
        let output = ChunkedClusters::assemble(batches.into_iter().flatten());
        info!(
            "Clustered {} keypoints into {} clusters over {} chunks",
            keypoints.len(),
            output.len(),
            output.chunks.len()
        );
        Ok(output)
    }

    fn cluster_chunk<M: Clone>(
        &self,
        chunk: ChunkIndex,
        bucket: &[KeyPoint<M>],
        cancel: &CancelToken,
    ) -> Result<(ChunkIndex, Clusters<M>)> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let clusters = self
            .clustering
            .start(bucket)?
            .with_cancel(cancel.clone())
            .run()?;
        debug!(
            "Chunk ({}, {}): {} keypoints -> {} clusters",
            chunk.row,
            chunk.col,
            bucket.len(),
            clusters.len()
        );
        Ok((chunk, clusters))
    }
}

impl Default for ChunkedClustering {
    fn default() -> Self {
        Self {
            clustering: HierarchicalClustering::default(),
            grid: ChunkGrid::default(),
            chunks_per_worker: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypoints(points: &[(i32, i32)]) -> Vec<KeyPoint> {
        points.iter().copied().map(KeyPoint::from).collect()
    }

    #[test]
    fn rejects_zero_batch_size() {
        assert!(matches!(
            ChunkedClustering::with_clustering(
                HierarchicalClustering::default(),
                ChunkGrid::default(),
                0
            ),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            ChunkedClustering::new(5.0, ChunkGrid { rows: 0, cols: 1 }),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn defaults() {
        let chunked = ChunkedClustering::default();
        assert_eq!(chunked.grid(), ChunkGrid { rows: 4, cols: 4 });
        assert_eq!(chunked.chunks_per_worker(), 2);
        assert_eq!(chunked.clustering().max_merge_distance(), 25.0);
    }

    #[test]
    fn empty_input() {
        let output = ChunkedClustering::default()
            .run::<()>(ImageDimensions::new(64, 64), &[])
            .unwrap();
        assert!(output.is_empty());
        assert!(output.chunks.is_empty());
    }

    #[test]
    fn chunk_border_blocks_merging() {
        let chunked = ChunkedClustering::new(5.0, ChunkGrid { rows: 1, cols: 2 }).unwrap();
        let dimensions = ImageDimensions::new(100, 100);
        // One pixel apart, but on either side of x = 50.
        let output = chunked.run(dimensions, &keypoints(&[(49, 10), (50, 10)])).unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output.chunks.len(), 2);
        // Within one chunk they merge.
        let output = chunked.run(dimensions, &keypoints(&[(48, 10), (49, 10)])).unwrap();
        assert_eq!(output.len(), 1);
        assert_eq!(output.chunks[0].chunk, ChunkIndex { row: 0, col: 0 });
    }

    #[test]
    fn output_is_row_major_concatenation() {
        let chunked = ChunkedClustering::new(5.0, ChunkGrid { rows: 2, cols: 2 }).unwrap();
        let output = chunked
            .run(
                ImageDimensions::new(100, 100),
                &keypoints(&[(80, 80), (10, 80), (80, 10), (81, 10)]),
            )
            .unwrap();
        let points: Vec<_> = output.keypoints.iter().map(|kp| kp.point).collect();
        assert_eq!(points, vec![(81, 10), (10, 80), (80, 80)]);
        assert_eq!(output.sizes, vec![2, 1, 1]);
    }

    #[test]
    fn cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = ChunkedClustering::default().run_with_cancel(
            ImageDimensions::new(100, 100),
            &keypoints(&[(1, 1)]),
            &cancel,
        );
        assert_eq!(result, Err(Error::Cancelled));
    }

    #[test]
    fn empty_input_on_tiny_image() {
        let chunked = ChunkedClustering::default();
        let dimensions = ImageDimensions::new(2, 2);
        let output = chunked.run::<()>(dimensions, &[]).unwrap();
        assert!(output.is_empty());
        assert!(output.chunks.is_empty());
        // With keypoints the grid still has to fit the image.
        assert!(matches!(
            chunked.run(dimensions, &keypoints(&[(1, 1)])),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn empty_input_on_tiny_image_in_pool() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap();
        let output = ChunkedClustering::default()
            .run_in::<()>(&pool, ImageDimensions::new(2, 2), &[])
            .unwrap();
        assert!(output.is_empty());
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn cancelled_pool_run_fails_whole_run() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap();
        let points: Vec<(i32, i32)> = (0..50)
            .map(|i| ((i * 37) % 200, (i * 53) % 200))
            .collect();
        let input = keypoints(&points);
        let dimensions = ImageDimensions::new(200, 200);
        let chunked = ChunkedClustering::default();
        let buckets = Partitioner::new(dimensions, chunked.grid())
            .unwrap()
            .partition(&input);
        assert!(buckets.iter().filter(|bucket| !bucket.is_empty()).count() > 2);

        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(
            chunked.run_in_with_cancel(&pool, dimensions, &input, &cancel),
            Err(Error::Cancelled)
        );
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn pool_matches_sequential() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(3)
            .build()
            .unwrap();
        let points: Vec<(i32, i32)> = (0..40)
            .map(|i| ((i * 37) % 200, (i * 53) % 150))
            .collect();
        let input = keypoints(&points);
        let dimensions = ImageDimensions::new(200, 150);
        for chunks_per_worker in [1, 2, 5] {
            let chunked = ChunkedClustering::with_clustering(
                HierarchicalClustering::new(20.0).unwrap(),
                ChunkGrid { rows: 3, cols: 4 },
                chunks_per_worker,
            )
            .unwrap();
            assert_eq!(
                chunked.run_in(&pool, dimensions, &input).unwrap(),
                chunked.run(dimensions, &input).unwrap()
            );
        }
    }
}
