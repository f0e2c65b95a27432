use crate::common::*;
use crate::counts::CountMatrix;
use crate::error::invalid_parameter;
use matrix_util::dmatrix_util::leave_one_group_out;
use matrix_util::traits::{ColumnStatOps, MatOps};
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Binomial, Distribution, Gamma, Uniform};
use serde::Serialize;

/// Prior of the contamination proportion of each cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum BetaPrior {
    /// `Beta(delta, delta)`
    Symmetric(f64),
    /// `Beta(delta1, delta2)`
    Asymmetric(f64, f64),
}

impl BetaPrior {
    /// One value for a symmetric prior, two for an asymmetric one
    pub fn from_values(values: &[f64]) -> anyhow::Result<Self> {
        match values {
            [d] => Ok(Self::Symmetric(*d)),
            [d1, d2] => Ok(Self::Asymmetric(*d1, *d2)),
            _ => Err(invalid_parameter(format!(
                "delta takes one or two values, got {}",
                values.len()
            ))),
        }
    }

    pub fn shape(&self) -> (f64, f64) {
        match *self {
            Self::Symmetric(d) => (d, d),
            Self::Asymmetric(d1, d2) => (d1, d2),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimArgs {
    /// Number of cells. Default: 300
    pub cells: usize,
    /// Number of genes. Default: 100
    pub genes: usize,
    /// Number of clusters. Default: 3
    pub clusters: usize,
    /// Smallest total count of a cell. Default: 500
    pub n_min: u64,
    /// Largest total count of a cell. Default: 1000
    pub n_max: u64,
    /// Dirichlet concentration of the native profiles. Default: 0.5
    pub beta: f64,
    /// Prior of the contamination proportion. Default: Beta(1, 2)
    pub delta: BetaPrior,
    /// Default: 12345
    pub seed: u64,
}

impl Default for SimArgs {
    fn default() -> Self {
        Self {
            cells: 300,
            genes: 100,
            clusters: 3,
            n_min: 500,
            n_max: 1000,
            beta: 0.5,
            delta: BetaPrior::Asymmetric(1., 2.),
            seed: 12345,
        }
    }
}

impl SimArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cells == 0 || self.genes == 0 {
            return Err(invalid_parameter(format!(
                "need at least one cell and one gene, got {} cells and {} genes",
                self.cells, self.genes
            )));
        }
        if self.clusters < 2 {
            return Err(invalid_parameter(format!(
                "need at least 2 clusters, got {}",
                self.clusters
            )));
        }
        if self.n_min == 0 || self.n_min > self.n_max {
            return Err(invalid_parameter(format!(
                "total counts must satisfy 1 <= n_min <= n_max, got [{}, {}]",
                self.n_min, self.n_max
            )));
        }
        if !(self.beta.is_finite() && self.beta > 0.) {
            return Err(invalid_parameter(format!(
                "beta must be positive, got {}",
                self.beta
            )));
        }
        let (d1, d2) = self.delta.shape();
        if !(d1.is_finite() && d1 > 0. && d2.is_finite() && d2 > 0.) {
            return Err(invalid_parameter(format!(
                "delta must be positive, got ({}, {})",
                d1, d2
            )));
        }
        Ok(())
    }
}

/// Simulated counts with the true split of every cell
#[derive(Debug, Clone)]
pub struct SimOut {
    /// genes x cells native counts
    pub native: Mat,
    /// genes x cells contamination counts
    pub contamination: Mat,
    /// `native + contamination`
    pub observed: Mat,
    /// cluster of each cell, `1 ..= num_clusters`
    pub z: Vec<usize>,
    /// genes x K native profiles
    pub phi: Mat,
    /// genes x K contamination profiles
    pub eta: Mat,
    /// contamination proportion drawn for each cell
    pub contamination_prop: Vec<f64>,
    pub num_clusters: usize,
    pub warnings: Vec<String>,
}

impl SimOut {
    /// Observed counts with default gene and cell names
    pub fn observed_counts(&self) -> anyhow::Result<CountMatrix> {
        CountMatrix::from_dense(&self.observed, None, None)
    }

    /// Share of each cell's observed counts that came from contamination
    pub fn true_contamination_fraction(&self) -> Vec<f64> {
        self.contamination
            .column_sums()
            .into_iter()
            .zip(self.observed.column_sums())
            .map(|(c, y)| if y > 0. { c / y } else { 0. })
            .collect()
    }

    /// Cluster labels as strings
    pub fn cluster_labels(&self) -> Vec<Box<str>> {
        self.z
            .iter()
            .map(|k| k.to_string().into_boxed_str())
            .collect()
    }
}

/// Split `n` draws over categories with probabilities `probs` by
/// sequential conditional binomials
fn sample_multinomial<R: Rng>(n: u64, probs: &[f64], rng: &mut R) -> anyhow::Result<Vec<f64>> {
    let mut ret = vec![0_f64; probs.len()];
    let mut remaining = n;
    let mut mass = probs.iter().sum::<f64>();

    for (i, &p) in probs.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        if i + 1 == probs.len() {
            ret[i] = remaining as f64;
            break;
        }
        let q = if mass > 0. { (p / mass).clamp(0., 1.) } else { 0. };
        let x = Binomial::new(remaining, q)
            .map_err(|e| anyhow::anyhow!("{}", e))?
            .sample(rng);
        ret[i] = x as f64;
        remaining -= x;
        mass -= p;
    }
    Ok(ret)
}

/// Normalized Gamma draws
fn sample_dirichlet<R: Rng>(dim: usize, alpha: f64, rng: &mut R) -> anyhow::Result<DVec> {
    let gamma = Gamma::new(alpha, 1.).map_err(|e| anyhow::anyhow!("{}", e))?;
    let mut x = DVec::from_iterator(dim, (0..dim).map(|_| gamma.sample(rng)));
    let tot = x.sum();
    if tot > 0. {
        x /= tot;
    } else {
        x.fill(1. / dim as f64);
    }
    Ok(x)
}

/// Generate counts from the native/contamination mixture
///
/// ```text
/// cp(c) ~ Beta(delta)
/// z(c) ~ Uniform{1..K}
/// N(c) ~ Uniform{Nmin..Nmax}
/// M(c) ~ Binomial(N(c), cp(c))
/// phi[,k] ~ Dirichlet(beta, ..., beta)
/// X[,c] ~ Multinomial(N(c) - M(c), phi[,z(c)])
/// eta[,k] = normalize( sum_{c: z(c) != k} X[,c] )
/// C[,c] ~ Multinomial(M(c), eta[,z(c)])
/// Y = X + C
/// ```
///
pub fn generate_contaminated_counts(args: &SimArgs) -> anyhow::Result<SimOut> {
    args.validate()?;

    let nn = args.cells;
    let dd = args.genes;
    let mut warnings = vec![];

    let mut rng = rand::rngs::StdRng::seed_from_u64(args.seed);

    // 1. contamination proportions
    let (d1, d2) = args.delta.shape();
    let rbeta = Beta::new(d1, d2).map_err(|e| anyhow::anyhow!("{}", e))?;
    let contamination_prop: Vec<f64> = (0..nn).map(|_| rbeta.sample(&mut rng)).collect();

    // 2. cluster membership, dropping clusters nobody landed in
    let runif_k = Uniform::new(0, args.clusters).map_err(|e| anyhow::anyhow!("{}", e))?;
    let raw_z: Vec<usize> = (0..nn).map(|_| runif_k.sample(&mut rng)).collect();

    let mut occupied = vec![false; args.clusters];
    raw_z.iter().for_each(|&k| occupied[k] = true);
    let mut new_index = vec![0; args.clusters];
    let mut kk = 0;
    for (k, &occ) in occupied.iter().enumerate() {
        if occ {
            new_index[k] = kk;
            kk += 1;
        }
    }
    let z: Vec<usize> = raw_z.iter().map(|&k| new_index[k]).collect();

    if kk < args.clusters {
        let msg = format!(
            "only {} of {} clusters have cells; using {} clusters",
            kk, args.clusters, kk
        );
        warn!("{}", msg);
        warnings.push(msg);
    }

    // 3. total and contamination counts
    let runif_n =
        Uniform::new_inclusive(args.n_min, args.n_max).map_err(|e| anyhow::anyhow!("{}", e))?;
    let totals: Vec<u64> = (0..nn).map(|_| runif_n.sample(&mut rng)).collect();

    let mut contam_totals = Vec::with_capacity(nn);
    for (&n, &cp) in totals.iter().zip(contamination_prop.iter()) {
        let m = Binomial::new(n, cp)
            .map_err(|e| anyhow::anyhow!("{}", e))?
            .sample(&mut rng);
        contam_totals.push(m);
    }

    // 4. native profiles and counts
    let mut phi = Mat::zeros(dd, kk);
    for k in 0..kk {
        phi.set_column(k, &sample_dirichlet(dd, args.beta, &mut rng)?);
    }

    let mut native = Mat::zeros(dd, nn);
    for j in 0..nn {
        let probs: Vec<f64> = phi.column(z[j]).iter().copied().collect();
        let x_j = sample_multinomial(totals[j] - contam_totals[j], &probs, &mut rng)?;
        native.set_column(j, &DVec::from_vec(x_j));
    }

    // 5. contamination profiles from the other clusters' native counts
    let eta = leave_one_group_out(&native.sum_columns_by_group(&z, kk))
        .sum_to_one_columns(DEFAULT_PSEUDOCOUNT);

    let mut contamination = Mat::zeros(dd, nn);
    for j in 0..nn {
        let probs: Vec<f64> = eta.column(z[j]).iter().copied().collect();
        let c_j = sample_multinomial(contam_totals[j], &probs, &mut rng)?;
        contamination.set_column(j, &DVec::from_vec(c_j));
    }

    let observed = &native + &contamination;

    info!(
        "simulated {} genes x {} cells in {} clusters",
        dd, nn, kk
    );

    Ok(SimOut {
        native,
        contamination,
        observed,
        z: z.into_iter().map(|k| k + 1).collect(),
        phi,
        eta,
        contamination_prop,
        num_clusters: kk,
        warnings,
    })
}
