use crate::knn_match::ColumnDict;

use nalgebra::DMatrix;
use rayon::prelude::*;

const DEFAULT_BLOCK_SIZE: usize = 1000;

/// Directed k-nearest-neighbour lists, closest first
pub struct KnnGraph {
    neighbours: Vec<Vec<usize>>,
    distances: Vec<Vec<f32>>,
}

pub struct KnnGraphArgs {
    pub knn: usize,
    pub block_size: usize,
    /// seed of the HNSW index
    pub seed: u64,
}

impl KnnGraph {
    /// Build a KNN graph from column vectors.
    ///
    /// * `points` - coordinate matrix (d x n), where each column is a point
    /// * `args` - KNN graph construction parameters
    pub fn from_columns(points: &DMatrix<f32>, args: KnnGraphArgs) -> anyhow::Result<KnnGraph> {
        let nn = points.ncols();
        let names = (0..nn).collect::<Vec<_>>();
        let columns = points.column_iter().collect();
        let dict = ColumnDict::from_dvector_views(columns, names, args.seed)?;

        let knn = args.knn.min(nn.saturating_sub(1));

        let per_block = create_jobs(nn, args.block_size)
            .into_par_iter()
            .map(|(lb, ub)| {
                (lb..ub)
                    .map(|i| dict.search_others(&i, knn))
                    .collect::<anyhow::Result<Vec<_>>>()
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let (neighbours, distances) = per_block.into_iter().flatten().unzip();

        Ok(KnnGraph {
            neighbours,
            distances,
        })
    }

    /// Build a KNN graph from row vectors (cells × features).
    ///
    /// * `data` - matrix (n x d), where each row is a point
    /// * `args` - KNN graph construction parameters
    pub fn from_rows(data: &DMatrix<f32>, args: KnnGraphArgs) -> anyhow::Result<KnnGraph> {
        Self::from_columns(&data.transpose(), args)
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.neighbours[node]
    }

    /// Distances parallel to [`KnnGraph::neighbors`]
    pub fn distances(&self, node: usize) -> &[f32] {
        &self.distances[node]
    }

    pub fn num_nodes(&self) -> usize {
        self.neighbours.len()
    }
}

fn create_jobs(ntot: usize, block_size: usize) -> Vec<(usize, usize)> {
    let block_size = if block_size == 0 {
        DEFAULT_BLOCK_SIZE
    } else {
        block_size
    };
    let nblock = ntot.div_ceil(block_size);
    (0..nblock)
        .map(|block| {
            let lb = block * block_size;
            let ub = ((block + 1) * block_size).min(ntot);
            (lb, ub)
        })
        .collect()
}
