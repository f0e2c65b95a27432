use crate::common::*;
use crate::counts::CountMatrix;
use crate::em::{fit_decont_em, EmFit};
use crate::error::invalid_parameter;
use crate::initializer::{ClusterInitializer, SvdDensityInitializer};
use crate::labels::*;
use crate::params::{DecontArgs, RunEcho};
use anyhow::Context;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressDrawTarget};
use matrix_util::utils::{derive_seed, partition_by_membership};
use rand::Rng;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Fitted model of one batch
#[derive(Debug, Clone)]
pub struct BatchFit {
    pub batch: Box<str>,
    /// columns of the full matrix owned by this batch
    pub cells: Vec<usize>,
    /// original (or numbered) name of each dense cluster
    pub cluster_names: Vec<Box<str>>,
    /// dense cluster of each cell in `cells`
    pub z: Vec<usize>,
    pub seed: u64,
    /// cells x 2, only when the clusters came from an initializer
    pub embedding: Option<Mat>,
    pub fit: EmFit,
}

/// Everything a decontamination run produces
#[derive(Debug, Clone)]
pub struct DecontResult {
    /// expected native counts, same shape, names and pattern as the input
    pub decontaminated: CountMatrix,
    /// contamination fraction of each cell
    pub contamination: Vec<f64>,
    /// cluster of each cell, `"{batch}-{label}"` with several batches
    pub clusters: Vec<Box<str>>,
    pub batches: BTreeMap<Box<str>, BatchFit>,
    pub echo: RunEcho,
}

/// Estimate and remove contamination batch by batch, finding clusters
/// with [`SvdDensityInitializer`] when no labels are given
///
/// * `counts` - genes x cells
/// * `z` - cluster label of each cell
/// * `batch` - batch label of each cell
/// * `args` - hyperparameters
pub fn run_decont(
    counts: &CountMatrix,
    z: Option<&[Box<str>]>,
    batch: Option<&[Box<str>]>,
    args: &DecontArgs,
) -> anyhow::Result<DecontResult> {
    run_decont_with(counts, z, batch, args, &SvdDensityInitializer)
}

/// Same as [`run_decont`] with a custom cluster initializer
pub fn run_decont_with(
    counts: &CountMatrix,
    z: Option<&[Box<str>]>,
    batch: Option<&[Box<str>]>,
    args: &DecontArgs,
    initializer: &dyn ClusterInitializer,
) -> anyhow::Result<DecontResult> {
    let nn = counts.num_cells();

    counts.check_nonempty_cells()?;
    args.validate()?;

    if let Some(z) = z {
        if z.len() != nn {
            return Err(invalid_parameter(format!(
                "{} cluster labels for {} cells",
                z.len(),
                nn
            )));
        }
    } else {
        args.init.validate()?;
    }

    let batch_labels = batch_labels_or_default(batch, nn)?;

    let (seed_used, reproducible) = match args.seed {
        Some(seed) => (seed, true),
        None => {
            let seed = rand::rng().random::<u64>();
            warn!(
                "no seed given; using {} (the result is not reproducible)",
                seed
            );
            (seed, false)
        }
    };

    let groups = partition_by_membership(&batch_labels);
    let multi_batch = groups.len() > 1;
    info!("{} cells in {} batch(es)", nn, groups.len());

    let jobs: Vec<(&Box<str>, &Vec<usize>)> = groups.iter().collect();

    let pb = ProgressBar::new(jobs.len() as u64);
    if !args.show_progress {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let fits = jobs
        .par_iter()
        .progress_with(pb)
        .map(|&(name, cells)| {
            let seed = derive_seed(seed_used, name);
            fit_one_batch(counts, cells, name, z, args, seed, initializer)
                .with_context(|| format!("batch {}", name))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    // put columns back in place
    let mut columns: Vec<Vec<f64>> = vec![vec![]; nn];
    let mut contamination = vec![0_f64; nn];
    let mut clusters: Vec<Box<str>> = vec![Box::from(""); nn];

    for bf in fits.iter() {
        for (loc, &glob) in bf.cells.iter().enumerate() {
            let x_j = bf.fit.decontaminated.col(loc);
            if x_j.row_indices() != counts.counts().col(glob).row_indices() {
                anyhow::bail!(
                    "batch {}: non-zero pattern of cell {} changed",
                    bf.batch,
                    counts.col_names()[glob]
                );
            }
            columns[glob] = x_j.values().to_vec();
            contamination[glob] = bf.fit.contamination[loc];

            let label = &bf.cluster_names[bf.z[loc]];
            clusters[glob] = if multi_batch {
                prefix_with_batch(&bf.batch, label)
            } else {
                label.clone()
            };
        }
    }

    let decontaminated = counts.with_values(columns.into_iter().flatten().collect())?;

    let echo = RunEcho {
        args: args.clone(),
        seed_used,
        reproducible,
        labels_supplied: z.is_some(),
        batches: groups.keys().cloned().collect(),
    };

    let batches = fits
        .into_iter()
        .map(|bf| (bf.batch.clone(), bf))
        .collect();

    Ok(DecontResult {
        decontaminated,
        contamination,
        clusters,
        batches,
        echo,
    })
}

fn fit_one_batch(
    counts: &CountMatrix,
    cells: &[usize],
    batch: &str,
    z: Option<&[Box<str>]>,
    args: &DecontArgs,
    seed: u64,
    initializer: &dyn ClusterInitializer,
) -> anyhow::Result<BatchFit> {
    let sub = counts.select_cells(cells);

    let (z, cluster_names, embedding) = match z {
        Some(z) => {
            let z_sub: Vec<&str> = cells.iter().map(|&j| z[j].as_ref()).collect();
            let dense = cluster_labels_for_em(&z_sub, cells.len())?;
            (dense.index, dense.names, None)
        }
        None => {
            let out = initializer.initialize(&sub, &args.init, seed)?;
            let names = numbered_names(out.num_clusters());
            let numbered: Vec<&str> = out.labels.iter().map(|&k| names[k].as_ref()).collect();
            cluster_labels_for_em(&numbered, cells.len())?;
            (out.labels, names, Some(out.embedding))
        }
    };

    info!(
        "batch {}: {} cells, {} clusters",
        batch,
        cells.len(),
        cluster_names.len()
    );

    let fit = fit_decont_em(sub.counts(), &z, args, seed)?;

    info!(
        "batch {}: {} iterations, mean contamination {:.4}",
        batch,
        fit.iterations,
        fit.contamination.iter().sum::<f64>() / cells.len() as f64
    );

    Ok(BatchFit {
        batch: Box::from(batch),
        cells: cells.to_vec(),
        cluster_names,
        z,
        seed,
        embedding,
        fit,
    })
}
