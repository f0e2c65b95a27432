//! Maximum-likelihood Dirichlet concentrations by fixed-point iteration.
//!
//! Given rows `p_i` on the simplex, Minka's update
//!
//! ```text
//! alpha_k <- digamma^{-1}( digamma(sum_l alpha_l) + mean_i ln p_ik )
//! ```
//!
//! increases the likelihood at every step. Starting values come from
//! moment matching. When the rows carry (almost) no variance the
//! likelihood is unbounded in the total concentration, so the total is
//! capped and every component is kept inside `[min_alpha, max_alpha]`.

use crate::common::*;
use crate::error::invalid_input;
use special::Gamma;

const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

/// Options for [`fit_dirichlet`]
#[derive(Debug, Clone)]
pub struct DirichletFitArgs {
    /// Maximum number of fixed-point updates. Default: 1000
    pub max_iter: usize,
    /// Stop when the largest relative change falls below this. Default: 1e-8
    pub tol: f64,
    /// Lower bound of each concentration. Default: 1e-6
    pub min_alpha: f64,
    /// Upper bound of the total concentration. Default: 1e6
    pub max_alpha: f64,
    /// Added before taking logs of proportions. Default: 1e-20
    pub pseudocount: f64,
}

impl Default for DirichletFitArgs {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tol: 1e-8,
            min_alpha: 1e-6,
            max_alpha: 1e6,
            pseudocount: DEFAULT_PSEUDOCOUNT,
        }
    }
}

/// Fit Dirichlet concentrations to the rows of `props`
/// * `props` - n x K proportions (K >= 2), each row summing to one
pub fn fit_dirichlet(props: &Mat, args: &DirichletFitArgs) -> anyhow::Result<DVec> {
    let nn = props.nrows();
    let kk = props.ncols();

    if nn == 0 {
        return Err(invalid_input("no rows to fit a Dirichlet distribution"));
    }
    if kk < 2 {
        return Err(invalid_input(format!(
            "a Dirichlet fit needs at least 2 columns, got {}",
            kk
        )));
    }

    let pc = args.pseudocount;
    let mean_log_p = DVec::from_iterator(
        kk,
        props
            .column_iter()
            .map(|p_k| p_k.iter().map(|&p| (p.max(0.) + pc).ln()).sum::<f64>() / nn as f64),
    );

    let mut alpha = moment_matching(props, args);

    for _ in 0..args.max_iter {
        let psi_sum = alpha.sum().digamma();
        let mut next = mean_log_p.map(|m| inv_digamma(psi_sum + m));
        clamp_concentration(&mut next, args);

        let change = next
            .iter()
            .zip(alpha.iter())
            .map(|(a, b)| ((a - b) / b).abs())
            .fold(0_f64, f64::max);

        alpha = next;
        if change < args.tol {
            break;
        }
    }

    Ok(alpha)
}

/// Fit a Beta distribution (2-component Dirichlet) to fractions
/// `r_i`, i.e., to the rows `(r_i, 1 - r_i)`
pub fn fit_beta(fractions: &[f64], args: &DirichletFitArgs) -> anyhow::Result<(f64, f64)> {
    let props = Mat::from_fn(fractions.len(), 2, |i, k| {
        let r = fractions[i].clamp(0., 1.);
        if k == 0 {
            r
        } else {
            1. - r
        }
    });
    let alpha = fit_dirichlet(&props, args)?;
    Ok((alpha[0], alpha[1]))
}

/// Method of moments on the first column:
/// `alpha_0 = (m1 - m2) / (m2 - m1^2)`, `alpha_k = alpha_0 * mean_k`
fn moment_matching(props: &Mat, args: &DirichletFitArgs) -> DVec {
    let nn = props.nrows() as f64;
    let mean = DVec::from_iterator(props.ncols(), props.column_iter().map(|p_k| p_k.sum() / nn));

    let m1 = mean[0];
    let m2 = props.column(0).iter().map(|p| p * p).sum::<f64>() / nn;
    let var = m2 - m1 * m1;

    let precision = if var > 0. {
        (m1 - m2) / var
    } else {
        args.max_alpha
    };

    let precision = if precision.is_finite() && precision > 0. {
        precision
    } else {
        1.
    };

    let mut alpha = mean * precision;
    clamp_concentration(&mut alpha, args);
    alpha
}

fn clamp_concentration(alpha: &mut DVec, args: &DirichletFitArgs) {
    alpha.apply(|a| {
        if !a.is_finite() {
            *a = args.max_alpha;
        }
    });
    let total = alpha.sum();
    if total > args.max_alpha {
        *alpha *= args.max_alpha / total;
    }
    alpha.apply(|a| *a = a.clamp(args.min_alpha, args.max_alpha));
}

/// Inverse of the digamma function (Minka 2000, Appendix C): a
/// starting value followed by five Newton steps
pub fn inv_digamma(y: f64) -> f64 {
    let mut x = if y >= -2.22 {
        y.exp() + 0.5
    } else {
        -1. / (y + EULER_MASCHERONI)
    };

    for _ in 0..5 {
        let step = (x.digamma() - y) / trigamma(x);
        x -= step;
        if x <= 0. {
            x = f64::MIN_POSITIVE.sqrt();
        }
    }
    x
}

/// Derivative of the digamma function, by the recurrence
/// `psi'(x) = psi'(x + 1) + 1/x^2` and the asymptotic series for large
/// `x`
pub fn trigamma(x: f64) -> f64 {
    if x <= 0. {
        return f64::INFINITY;
    }

    let mut x = x;
    let mut acc = 0.;
    while x < 8. {
        acc += 1. / (x * x);
        x += 1.;
    }

    let x2 = x * x;
    let series = 1. / x + 1. / (2. * x2) + 1. / (6. * x2 * x) - 1. / (30. * x2 * x2 * x)
        + 1. / (42. * x2 * x2 * x2 * x)
        - 1. / (30. * x2 * x2 * x2 * x2 * x);
    acc + series
}
