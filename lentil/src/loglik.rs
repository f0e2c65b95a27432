use crate::common::*;
use rayon::prelude::*;
use serde::Serialize;

/// Log-likelihood values recorded at selected iterations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogLikelihoodTrace {
    iterations: Vec<usize>,
    values: Vec<f64>,
}

impl LogLikelihoodTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, iter: usize, value: f64) {
        self.iterations.push(iter);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iterations(&self) -> &[usize] {
        &self.iterations
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

}

/// Log-likelihood of the native/contamination mixture
///
/// ```text
/// sum_{g,c} y(g,c) * ln( theta(c) phi(g,z(c)) + (1 - theta(c)) eta(g,z(c)) + pc )
/// ```
///
/// * `counts` - genes x cells
/// * `z` - cluster of each cell in `0 .. K`
/// * `theta` - native proportion of each cell
/// * `phi` - genes x K native profiles
/// * `eta` - genes x K contamination profiles
/// * `pseudocount` - additive floor inside the log
pub fn decont_log_likelihood(
    counts: &CscMat,
    z: &[usize],
    theta: &[f64],
    phi: &Mat,
    eta: &Mat,
    pseudocount: f64,
) -> f64 {
    // per-cell sums in parallel, then added up in a fixed order
    let per_cell: Vec<f64> = (0..counts.ncols())
        .into_par_iter()
        .map(|j| {
            let y_j = counts.col(j);
            let k = z[j];
            let th = theta[j];
            y_j.row_indices()
                .iter()
                .zip(y_j.values())
                .map(|(&g, &y)| {
                    y * (th * phi[(g, k)] + (1. - th) * eta[(g, k)] + pseudocount).ln()
                })
                .sum::<f64>()
        })
        .collect();

    per_cell.iter().sum()
}

/// Keeps the stopping state of the EM loop together with the
/// log-likelihood trace.
///
/// The loop goes on while `iter <= max_iter`, the largest change of
/// theta is not below the threshold, and the count of iterations
/// without improvement stays within `stop_iter`. Nothing increments
/// that count at the moment, so only the first two conditions ever
/// stop the loop.
#[derive(Debug, Clone)]
pub struct LogLikelihoodTracker {
    max_iter: usize,
    convergence: f64,
    iter_loglik: usize,
    stop_iter: usize,
    num_iter_without_improvement: usize,
    iter: usize,
    converged: bool,
    last_change: f64,
    trace: LogLikelihoodTrace,
}

impl LogLikelihoodTracker {
    pub fn new(max_iter: usize, convergence: f64, iter_loglik: usize) -> Self {
        Self {
            max_iter,
            convergence,
            iter_loglik: iter_loglik.max(1),
            stop_iter: 3,
            num_iter_without_improvement: 0,
            iter: 1,
            converged: false,
            last_change: f64::INFINITY,
            trace: LogLikelihoodTrace::new(),
        }
    }

    pub fn should_continue(&self) -> bool {
        self.iter <= self.max_iter
            && !self.converged
            && self.num_iter_without_improvement <= self.stop_iter
    }

    /// Record the largest absolute change of theta after one EM step.
    /// Returns true if the log-likelihood should be evaluated for this
    /// iteration.
    pub fn record_step(&mut self, max_theta_change: f64) -> bool {
        self.last_change = max_theta_change;
        if max_theta_change < self.convergence {
            self.converged = true;
        }
        self.iter % self.iter_loglik == 0 || self.converged
    }

    /// Log-likelihood right after initialization (iteration 0)
    pub fn record_initial_log_likelihood(&mut self, value: f64) {
        debug!("iteration {:>5}: log-likelihood = {:.4}", 0, value);
        self.trace.push(0, value);
    }

    /// Log-likelihood after the current iteration's step
    pub fn record_log_likelihood(&mut self, value: f64) {
        debug!("iteration {:>5}: log-likelihood = {:.4}", self.iter, value);
        self.trace.push(self.iter, value);
    }

    /// Move on to the next iteration
    pub fn advance(&mut self) {
        self.iter += 1;
    }

    /// Number of EM steps taken so far
    pub fn iterations(&self) -> usize {
        self.iter - 1
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn last_change(&self) -> f64 {
        self.last_change
    }

    pub fn into_trace(self) -> LogLikelihoodTrace {
        self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use matrix_util::dmatrix_util::csc_from_dense;

    #[test]
    fn log_likelihood_by_hand() {
        let yy = Mat::from_row_slice(2, 2, &[2., 0., 1., 3.]);
        let counts = csc_from_dense(&yy);
        let z = vec![0, 1];
        let theta = vec![0.8, 0.6];
        let phi = Mat::from_row_slice(2, 2, &[0.7, 0.2, 0.3, 0.8]);
        let eta = Mat::from_row_slice(2, 2, &[0.2, 0.7, 0.8, 0.3]);

        let expected = 2. * (0.8 * 0.7 + 0.2 * 0.2_f64).ln()
            + 1. * (0.8 * 0.3 + 0.2 * 0.8_f64).ln()
            + 3. * (0.6 * 0.8 + 0.4 * 0.3_f64).ln();

        let ll = decont_log_likelihood(&counts, &z, &theta, &phi, &eta, 0.);
        assert_abs_diff_eq!(ll, expected, epsilon = 1e-12);
    }

    #[test]
    fn tracker_cadence_and_stopping() {
        let mut tracker = LogLikelihoodTracker::new(100, 0.01, 3);
        tracker.record_initial_log_likelihood(-10.);

        let changes = [0.5, 0.4, 0.3, 0.2, 0.005];
        for &ch in &changes {
            assert!(tracker.should_continue());
            if tracker.record_step(ch) {
                tracker.record_log_likelihood(-1.);
            }
            tracker.advance();
        }

        assert!(!tracker.should_continue());
        assert!(tracker.converged());
        assert_eq!(tracker.iterations(), 5);
        // iteration 0, the cadence at 3, and the converging iteration 5
        assert_eq!(tracker.into_trace().iterations(), &[0, 3, 5]);
    }

    #[test]
    fn tracker_stops_at_max_iter() {
        let mut tracker = LogLikelihoodTracker::new(4, 1e-6, 10);
        while tracker.should_continue() {
            tracker.record_step(1.);
            tracker.advance();
        }
        assert_eq!(tracker.iterations(), 4);
        assert!(!tracker.converged());
    }
}
