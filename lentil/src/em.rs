//! EM for the native/contamination mixture of one batch.
//!
//! Every observed count `y(g,c)` of a cell `c` in cluster `k = z(c)` is
//! either native, drawn from `phi[,k]` with probability `theta(c)`, or
//! contamination, drawn from `eta[,k]`, the pooled profile of all the
//! other clusters. The E-step splits each non-zero count by its
//! responsibility; the M-step re-estimates the profiles, the Beta prior
//! on `theta`, and `theta` itself.

use crate::common::*;
use crate::counts::csc_with_values;
use crate::dirichlet::{fit_beta, DirichletFitArgs};
use crate::error::{invalid_input, invalid_parameter};
use crate::loglik::*;
use crate::params::DecontArgs;
use matrix_util::dmatrix_util::leave_one_group_out;
use matrix_util::traits::{ColumnStatOps, MatOps};
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};
use rayon::prelude::*;

/// Keep initial `theta` draws off the boundary
const THETA_FLOOR: f64 = 1e-10;

/// Parameters of a finished run
#[derive(Debug, Clone)]
pub struct EmFit {
    /// native proportion of each cell
    pub theta: Vec<f64>,
    /// genes x K native profiles
    pub phi: Mat,
    /// genes x K contamination profiles
    pub eta: Mat,
    /// Beta prior on `theta`
    pub delta: (f64, f64),
    /// expected native counts, same pattern as the input
    pub decontaminated: CscMat,
    /// `1 - native / total` of each cell
    pub contamination: Vec<f64>,
    pub trace: LogLikelihoodTrace,
    /// number of EM steps taken
    pub iterations: usize,
    pub converged: bool,
}

/// Column-normalize aggregated counts, flooring by the pseudocount
/// both before and after normalization
fn initial_profiles(mass: &Mat, pseudocount: f64) -> Mat {
    mass.sum_to_one_columns(pseudocount).sum_to_one_columns(pseudocount)
}

/// Solver state for one batch
pub struct DecontEm<'a> {
    counts: &'a CscMat,
    z: &'a [usize],
    num_clusters: usize,
    pseudocount: f64,
    totals: Vec<f64>,
    theta: Vec<f64>,
    phi: Mat,
    eta: Mat,
    delta: (f64, f64),
    dirichlet: DirichletFitArgs,
}

/// Check the counts and labels handed over to the solver; returns the
/// number of clusters and the total counts of each cell
fn check_data(counts: &CscMat, z: &[usize]) -> anyhow::Result<(usize, Vec<f64>)> {
    if counts.nrows() == 0 || counts.ncols() == 0 {
        return Err(invalid_input(format!(
            "counts must be a genes x cells matrix, got [{} x {}]",
            counts.nrows(),
            counts.ncols()
        )));
    }

    if let Some(&x) = counts.values().iter().find(|&&x| !x.is_finite() || x < 0.) {
        return Err(invalid_input(format!(
            "counts must be finite and non-negative, found {}",
            x
        )));
    }

    let totals = counts.column_sums();
    if let Some(j) = totals.iter().position(|&s| s <= 0.) {
        return Err(invalid_input(format!("cell {} has no counts", j)));
    }

    if z.len() != counts.ncols() {
        return Err(invalid_parameter(format!(
            "{} cluster labels for {} cells",
            z.len(),
            counts.ncols()
        )));
    }

    let num_clusters = z.iter().max().map(|&k| k + 1).unwrap_or(0);
    let mut seen = vec![false; num_clusters];
    z.iter().for_each(|&k| seen[k] = true);
    let num_distinct = seen.iter().filter(|&&s| s).count();

    if num_distinct < 2 {
        return Err(invalid_parameter(format!(
            "need at least 2 distinct cluster labels, found {}",
            num_distinct
        )));
    }

    Ok((num_clusters, totals))
}

impl<'a> DecontEm<'a> {
    /// Start from `theta ~ Beta(delta, delta)` and profiles built from the
    /// raw counts of each cluster
    ///
    /// * `counts` - genes x cells of one batch
    /// * `z` - cluster of each cell, `0 .. K`
    /// * `args` - hyperparameters
    /// * `seed` - seeds the `theta` draws
    pub fn new(
        counts: &'a CscMat,
        z: &'a [usize],
        args: &DecontArgs,
        seed: u64,
    ) -> anyhow::Result<Self> {
        args.validate()?;
        let (num_clusters, totals) = check_data(counts, z)?;

        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let beta = Beta::new(args.delta, args.delta).map_err(|e| anyhow::anyhow!("{}", e))?;
        let theta: Vec<f64> = (0..counts.ncols())
            .map(|_| beta.sample(&mut rng).clamp(THETA_FLOOR, 1. - THETA_FLOOR))
            .collect();

        let pc = args.pseudocount;
        let own = counts.sum_columns_by_group(z, num_clusters);
        let others = leave_one_group_out(&own);

        Ok(Self {
            counts,
            z,
            num_clusters,
            pseudocount: pc,
            totals,
            theta,
            phi: initial_profiles(&own, pc),
            eta: initial_profiles(&others, pc),
            delta: (args.delta, args.delta),
            dirichlet: DirichletFitArgs {
                pseudocount: pc,
                ..Default::default()
            },
        })
    }

    /// Resume from given parameters instead of a random start
    pub fn from_state(
        counts: &'a CscMat,
        z: &'a [usize],
        args: &DecontArgs,
        theta: Vec<f64>,
        phi: Mat,
        eta: Mat,
        delta: (f64, f64),
    ) -> anyhow::Result<Self> {
        args.validate()?;
        let (num_clusters, totals) = check_data(counts, z)?;

        if theta.len() != counts.ncols() {
            return Err(invalid_parameter(format!(
                "{} theta values for {} cells",
                theta.len(),
                counts.ncols()
            )));
        }

        let dims = (counts.nrows(), num_clusters);
        if phi.shape() != dims || eta.shape() != dims {
            return Err(invalid_parameter(format!(
                "profiles must be [{} x {}], got phi {:?} and eta {:?}",
                dims.0,
                dims.1,
                phi.shape(),
                eta.shape()
            )));
        }

        Ok(Self {
            counts,
            z,
            num_clusters,
            pseudocount: args.pseudocount,
            totals,
            theta,
            phi,
            eta,
            delta,
            dirichlet: DirichletFitArgs {
                pseudocount: args.pseudocount,
                ..Default::default()
            },
        })
    }

    pub fn theta(&self) -> &[f64] {
        &self.theta
    }

    pub fn phi(&self) -> &Mat {
        &self.phi
    }

    pub fn eta(&self) -> &Mat {
        &self.eta
    }

    pub fn delta(&self) -> (f64, f64) {
        self.delta
    }

    /// Expected native counts at the non-zero elements (aligned with
    /// the stored values of `counts`) and their sum within each cell
    fn e_step(&self) -> (Vec<f64>, Vec<f64>) {
        let pc = self.pseudocount;

        let per_cell: Vec<Vec<f64>> = (0..self.counts.ncols())
            .into_par_iter()
            .map(|j| {
                let y_j = self.counts.col(j);
                let k = self.z[j];
                let th = self.theta[j];
                y_j.row_indices()
                    .iter()
                    .zip(y_j.values())
                    .map(|(&g, &y)| {
                        let native = th * self.phi[(g, k)];
                        let denom = native + (1. - th) * self.eta[(g, k)] + pc;
                        if denom > 0. {
                            y * native / denom
                        } else {
                            0.
                        }
                    })
                    .collect()
            })
            .collect();

        let native: Vec<f64> = per_cell.iter().map(|x| x.iter().sum()).collect();
        let est = per_cell.into_iter().flatten().collect();
        (est, native)
    }

    /// Update the profiles, delta and theta; returns `max |theta change|`
    fn m_step(&mut self, est: Vec<f64>, native: &[f64]) -> anyhow::Result<f64> {
        let pc = self.pseudocount;
        let est = csc_with_values(self.counts, est)?;

        let own = est.sum_columns_by_group(self.z, self.num_clusters);
        let others = leave_one_group_out(&own);
        self.phi = own.sum_to_one_columns(pc);
        self.eta = others.sum_to_one_columns(pc);

        let fractions: Vec<f64> = native
            .iter()
            .zip(self.totals.iter())
            .map(|(n, t)| n / t)
            .collect();

        self.delta = fit_beta(&fractions, &self.dirichlet)?;
        let (d1, d2) = self.delta;

        let mut max_change = 0_f64;
        for ((th, &n), &t) in self.theta.iter_mut().zip(native).zip(self.totals.iter()) {
            let next = (n + d1) / (t + d1 + d2);
            max_change = max_change.max((next - *th).abs());
            *th = next;
        }
        Ok(max_change)
    }

    /// One E-step followed by one M-step
    pub fn step(&mut self) -> anyhow::Result<f64> {
        let (est, native) = self.e_step();
        self.m_step(est, &native)
    }

    pub fn log_likelihood(&self) -> f64 {
        decont_log_likelihood(
            self.counts,
            self.z,
            &self.theta,
            &self.phi,
            &self.eta,
            self.pseudocount,
        )
    }

    /// Iterate until `theta` settles or `max_iter` steps are taken,
    /// then split the counts once more with the final parameters
    pub fn run(mut self, args: &DecontArgs) -> anyhow::Result<EmFit> {
        let mut tracker =
            LogLikelihoodTracker::new(args.max_iter, args.convergence, args.iter_loglik);

        tracker.record_initial_log_likelihood(self.log_likelihood());

        while tracker.should_continue() {
            let change = self.step()?;
            if tracker.record_step(change) {
                tracker.record_log_likelihood(self.log_likelihood());
            }
            tracker.advance();
        }

        let converged = tracker.converged();
        let iterations = tracker.iterations();

        if converged {
            info!(
                "converged after {} iterations, delta = ({:.3}, {:.3})",
                iterations, self.delta.0, self.delta.1
            );
        } else {
            warn!(
                "no convergence within {} iterations (last change {:.2e})",
                iterations,
                tracker.last_change()
            );
        }

        let (est, native) = self.e_step();
        let contamination = native
            .iter()
            .zip(self.totals.iter())
            .map(|(n, t)| (1. - n / t).clamp(0., 1.))
            .collect();
        let decontaminated = csc_with_values(self.counts, est)?;

        Ok(EmFit {
            theta: self.theta,
            phi: self.phi,
            eta: self.eta,
            delta: self.delta,
            decontaminated,
            contamination,
            trace: tracker.into_trace(),
            iterations,
            converged,
        })
    }
}

/// Fit the mixture to one batch of cells
/// * `counts` - genes x cells
/// * `z` - cluster of each cell, `0 .. K`, at least 2 distinct values
/// * `args` - hyperparameters
/// * `seed` - seed of this batch
pub fn fit_decont_em(
    counts: &CscMat,
    z: &[usize],
    args: &DecontArgs,
    seed: u64,
) -> anyhow::Result<EmFit> {
    DecontEm::new(counts, z, args, seed)?.run(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{is_invalid_input, is_invalid_parameter};
    use approx::assert_abs_diff_eq;
    use matrix_util::dmatrix_util::{csc_from_dense, csc_to_dense};

    fn two_clusters() -> (CscMat, Vec<usize>) {
        let yy = Mat::from_row_slice(
            4,
            6,
            &[
                30., 25., 28., 2., 1., 3., //
                20., 22., 18., 1., 2., 0., //
                1., 3., 2., 26., 30., 24., //
                2., 0., 1., 21., 19., 23., //
            ],
        );
        (csc_from_dense(&yy), vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn initial_profiles_floor_unseen_genes() -> anyhow::Result<()> {
        // gene 2 never appears in cluster 0
        let yy = Mat::from_row_slice(
            3,
            4,
            &[
                40., 35., 5., 4., //
                30., 20., 6., 5., //
                0., 0., 30., 40., //
            ],
        );
        let counts = csc_from_dense(&yy);
        let z = vec![0, 0, 1, 1];
        let pc = 1e-2;
        let args = DecontArgs {
            pseudocount: pc,
            ..Default::default()
        };
        let em = DecontEm::new(&counts, &z, &args, 3)?;

        assert!(em.phi()[(2, 0)] >= pc / (1. + 3. * pc));
        for k in 0..2 {
            assert_abs_diff_eq!(em.phi().column(k).sum(), 1., epsilon = 1e-12);
            assert_abs_diff_eq!(em.eta().column(k).sum(), 1., epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn initial_profiles_are_normalized() -> anyhow::Result<()> {
        let (counts, z) = two_clusters();
        let em = DecontEm::new(&counts, &z, &DecontArgs::default(), 1)?;

        for k in 0..2 {
            assert_abs_diff_eq!(em.phi().column(k).sum(), 1., epsilon = 1e-6);
            assert_abs_diff_eq!(em.eta().column(k).sum(), 1., epsilon = 1e-6);
        }
        // eta of cluster 0 is the profile of cluster 1
        assert_abs_diff_eq!(
            em.eta().column(0).clone_owned(),
            em.phi().column(1).clone_owned(),
            epsilon = 1e-12
        );
        assert!(em.theta().iter().all(|&t| t > 0. && t < 1.));
        Ok(())
    }

    #[test]
    fn every_step_keeps_the_invariants() -> anyhow::Result<()> {
        let (counts, z) = two_clusters();
        let mut em = DecontEm::new(&counts, &z, &DecontArgs::default(), 7)?;

        for _ in 0..20 {
            em.step()?;
            for k in 0..2 {
                assert_abs_diff_eq!(em.phi().column(k).sum(), 1., epsilon = 1e-6);
                assert_abs_diff_eq!(em.eta().column(k).sum(), 1., epsilon = 1e-6);
            }
            assert!(em.theta().iter().all(|&t| t > 0. && t < 1.));
            let (d1, d2) = em.delta();
            assert!(d1 > 0. && d2 > 0. && d1.is_finite() && d2.is_finite());
        }
        Ok(())
    }

    #[test]
    fn decontaminated_counts_stay_below_the_input() -> anyhow::Result<()> {
        let (counts, z) = two_clusters();
        let fit = fit_decont_em(&counts, &z, &DecontArgs::default(), 42)?;

        let yy = csc_to_dense(&counts);
        let xx = csc_to_dense(&fit.decontaminated);
        assert!(xx.iter().zip(yy.iter()).all(|(x, y)| *x >= 0. && x <= y));

        for (j, &c) in fit.contamination.iter().enumerate() {
            assert!((0. ..=1.).contains(&c));
            assert_abs_diff_eq!(
                xx.column(j).sum(),
                (1. - c) * yy.column(j).sum(),
                epsilon = 1e-8
            );
        }

        assert_eq!(fit.trace.iterations()[0], 0);
        Ok(())
    }

    #[test]
    fn bad_labels_and_empty_cells() {
        let (counts, _) = two_clusters();
        let one = vec![0; 6];
        let err = fit_decont_em(&counts, &one, &DecontArgs::default(), 1).unwrap_err();
        assert!(is_invalid_parameter(&err));

        let short = vec![0, 1];
        let err = fit_decont_em(&counts, &short, &DecontArgs::default(), 1).unwrap_err();
        assert!(is_invalid_parameter(&err));

        let yy = Mat::from_row_slice(2, 3, &[1., 0., 2., 3., 0., 1.]);
        let counts = csc_from_dense(&yy);
        let err = fit_decont_em(&counts, &[0, 1, 1], &DecontArgs::default(), 1).unwrap_err();
        assert!(is_invalid_input(&err));
    }
}
