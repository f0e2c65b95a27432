//! Cluster labels for cells when none are given.

use crate::common::*;
use crate::counts::CountMatrix;
use crate::error::invalid_input;
use crate::params::InitializerArgs;
use matrix_util::dmatrix_rsvd::RSVD;
use matrix_util::knn_graph::{KnnGraph, KnnGraphArgs};
use matrix_util::knn_match::{ColumnDict, MakeVecPoint};
use matrix_util::traits::MatOps;
use nalgebra::DMatrix;

/// Minimum neighbourhood size of a core point
const MIN_POINTS: usize = 4;

/// Neighbourhoods are searched among this many nearest cells
const MAX_NEIGHBOURS: usize = 30;

const KNN_BLOCK_SIZE: usize = 1000;

/// Scale factor of the counts-per-total normalization
const SCALE_FACTOR: f64 = 1e4;

pub struct InitializerOutput {
    /// dense 0-based cluster of each cell
    pub labels: Vec<usize>,
    /// cells x 2
    pub embedding: Mat,
}

impl InitializerOutput {
    pub fn num_clusters(&self) -> usize {
        self.labels.iter().max().map(|&k| k + 1).unwrap_or(0)
    }
}

/// Anything that can assign cells to at least two clusters
pub trait ClusterInitializer: Send + Sync {
    fn initialize(
        &self,
        counts: &CountMatrix,
        args: &InitializerArgs,
        seed: u64,
    ) -> anyhow::Result<InitializerOutput>;
}

/// Variable genes, randomized SVD, then density clustering of the
/// leading two cell loadings
#[derive(Debug, Clone, Default)]
pub struct SvdDensityInitializer;

impl ClusterInitializer for SvdDensityInitializer {
    fn initialize(
        &self,
        counts: &CountMatrix,
        args: &InitializerArgs,
        seed: u64,
    ) -> anyhow::Result<InitializerOutput> {
        args.validate()?;

        let nn = counts.num_cells();
        if nn < 2 {
            return Err(invalid_input(format!(
                "need at least 2 cells to find clusters, got {}",
                nn
            )));
        }

        let totals = counts.cell_totals();
        let genes = top_variable_genes(counts, &totals, args.var_genes);

        let mut x_sel = log_normalize_genes(counts, &totals, &genes);
        for mut x_g in x_sel.row_iter_mut() {
            let mu = x_g.mean();
            x_g.add_scalar_mut(-mu);
        }

        let rank = args.num_modules.min(x_sel.nrows()).min(x_sel.ncols());
        let (_, dd, vv) = x_sel.rsvd(rank, seed)?;

        let mut embedding = Mat::zeros(nn, 2);
        for k in 0..dd.len().min(2) {
            embedding.set_column(k, &(vv.column(k) * dd[k]));
        }
        embedding.scale_columns_inplace();

        let found = if embedding.iter().all(|x| x.is_finite()) {
            dbscan(&embedding, args.resolution, MIN_POINTS, seed)?
        } else {
            None
        };

        let labels = match found {
            Some(labels) if num_distinct(&labels) >= 2 => labels,
            _ => {
                info!("density clustering found < 2 clusters; splitting at the median");
                median_split(&embedding)
            }
        };

        info!(
            "{} clusters over {} cells ({} genes, rank {})",
            num_distinct(&labels),
            nn,
            genes.len(),
            rank
        );

        Ok(InitializerOutput { labels, embedding })
    }
}

/// `ln(1 + 1e4 * y / total)` of a non-zero count
fn log_cp10k(y: f64, total: f64) -> f64 {
    (SCALE_FACTOR * y / total).ln_1p()
}

/// Indexes of the `n` genes whose log-normalized expression varies the
/// most across cells, in row order. Only the non-zero counts are
/// visited.
fn top_variable_genes(counts: &CountMatrix, totals: &[f64], n: usize) -> Vec<usize> {
    let dd = counts.num_genes();
    let nn = counts.num_cells() as f64;

    let mut sum = vec![0_f64; dd];
    let mut sum_sq = vec![0_f64; dd];

    for (y_j, &tot) in counts.counts().col_iter().zip(totals) {
        if tot <= 0. {
            continue;
        }
        for (&g, &y) in y_j.row_indices().iter().zip(y_j.values()) {
            let x = log_cp10k(y, tot);
            sum[g] += x;
            sum_sq[g] += x * x;
        }
    }

    let var: Vec<f64> = sum
        .iter()
        .zip(sum_sq.iter())
        .map(|(&s, &ss)| {
            let mu = s / nn;
            (ss / nn - mu * mu).max(0.)
        })
        .collect();

    let mut order: Vec<usize> = (0..dd).collect();
    order.sort_by(|&a, &b| var[b].total_cmp(&var[a]).then(a.cmp(&b)));
    order.truncate(n.max(1));
    order.sort_unstable();
    order
}

/// `genes.len() x cells` dense log-normalized expression of the
/// selected genes
fn log_normalize_genes(counts: &CountMatrix, totals: &[f64], genes: &[usize]) -> Mat {
    let mut position: Vec<Option<usize>> = vec![None; counts.num_genes()];
    for (i, &g) in genes.iter().enumerate() {
        position[g] = Some(i);
    }

    let mut ret = Mat::zeros(genes.len(), counts.num_cells());
    for (j, (y_j, &tot)) in counts.counts().col_iter().zip(totals).enumerate() {
        if tot <= 0. {
            continue;
        }
        for (&g, &y) in y_j.row_indices().iter().zip(y_j.values()) {
            if let Some(i) = position[g] {
                ret[(i, j)] = log_cp10k(y, tot);
            }
        }
    }
    ret
}

fn median(mut x: Vec<f64>) -> f64 {
    x.sort_by(f64::total_cmp);
    let n = x.len();
    if n == 0 {
        0.
    } else if n % 2 == 1 {
        x[n / 2]
    } else {
        (x[n / 2 - 1] + x[n / 2]) / 2.
    }
}

fn num_distinct(labels: &[usize]) -> usize {
    let mut x = labels.to_vec();
    x.sort_unstable();
    x.dedup();
    x.len()
}

/// DBSCAN over the rows of `points` (n x 2) with
/// `eps = resolution * median distance to the MIN_POINTS-th neighbour`.
/// Neighbourhoods come from an HNSW k-nearest-neighbour graph, so only
/// the `MAX_NEIGHBOURS` closest cells can fall within `eps`. Noise
/// points join the cluster of their nearest core point. `None` if
/// there are too few points or no core point.
fn dbscan(
    points: &Mat,
    resolution: f64,
    min_points: usize,
    seed: u64,
) -> anyhow::Result<Option<Vec<usize>>> {
    let nn = points.nrows();
    if nn <= min_points {
        return Ok(None);
    }

    // d x n, one column per point
    let columns: DMatrix<f32> = points.transpose().map(|x| x as f32);

    let graph = KnnGraph::from_columns(
        &columns,
        KnnGraphArgs {
            knn: MAX_NEIGHBOURS.max(min_points),
            block_size: KNN_BLOCK_SIZE,
            seed,
        },
    )?;

    let knn_dist: Vec<f64> = (0..nn)
        .map(|i| {
            graph
                .distances(i)
                .get(min_points - 1)
                .map_or(f64::INFINITY, |&d| d as f64)
        })
        .collect();

    let eps = resolution * median(knn_dist);

    // each point is in its own neighbourhood
    let neighbours: Vec<Vec<usize>> = (0..nn)
        .map(|i| {
            std::iter::once(i)
                .chain(
                    graph
                        .neighbors(i)
                        .iter()
                        .zip(graph.distances(i))
                        .filter(|&(_, &d)| d as f64 <= eps)
                        .map(|(&j, _)| j),
                )
                .collect()
        })
        .collect();

    let is_core: Vec<bool> = neighbours.iter().map(|nb| nb.len() >= min_points).collect();
    if !is_core.iter().any(|&c| c) {
        return Ok(None);
    }

    let mut labels: Vec<Option<usize>> = vec![None; nn];
    let mut num_clusters = 0;

    for i in 0..nn {
        if !is_core[i] || labels[i].is_some() {
            continue;
        }
        let k = num_clusters;
        num_clusters += 1;
        labels[i] = Some(k);
        let mut stack = vec![i];
        while let Some(p) = stack.pop() {
            for &q in &neighbours[p] {
                if labels[q].is_none() {
                    labels[q] = Some(k);
                    if is_core[q] {
                        stack.push(q);
                    }
                }
            }
        }
    }

    let cores: Vec<usize> = (0..nn).filter(|&i| is_core[i]).collect();
    let core_dict = ColumnDict::from_dvector_views(
        cores.iter().map(|&i| columns.column(i)).collect(),
        cores,
        seed,
    )?;

    Ok((0..nn)
        .map(|i| match labels[i] {
            Some(k) => Some(k),
            None => {
                let (nearest, _) = core_dict.search_by_query(&columns.column(i).to_vp(), 1);
                nearest.first().and_then(|&c| labels[c])
            }
        })
        .collect::<Option<Vec<usize>>>())
}

/// Lower half of the first axis vs. the upper half
fn median_split(points: &Mat) -> Vec<usize> {
    let nn = points.nrows();
    let mut order: Vec<usize> = (0..nn).collect();
    order.sort_by(|&a, &b| points[(a, 0)].total_cmp(&points[(b, 0)]).then(a.cmp(&b)));

    let mut labels = vec![1; nn];
    for &i in order.iter().take(nn / 2) {
        labels[i] = 0;
    }
    labels
}
