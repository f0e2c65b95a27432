use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
pub use nalgebra_sparse::{coo::CooMatrix, csc::CscMatrix};
use rand_distr::StandardNormal;

impl MatOps for DMatrix<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn sum_to_one_columns_inplace(&mut self, pseudocount: f64) {
        for mut x_j in self.column_iter_mut() {
            x_j.add_scalar_mut(pseudocount);
            let denom = x_j.sum();
            if denom > 0. {
                x_j /= denom;
            }
        }
    }

    fn sum_to_one_columns(&self, pseudocount: f64) -> Self::Mat {
        let mut ret = self.clone();
        ret.sum_to_one_columns_inplace(pseudocount);
        ret
    }

    fn scale_columns_inplace(&mut self) {
        let nn = self.nrows() as f64;
        if nn < 2. {
            return;
        }
        for mut x_j in self.column_iter_mut() {
            let mu = x_j.mean();
            x_j.add_scalar_mut(-mu);
            let sd = (x_j.norm_squared() / (nn - 1.)).sqrt();
            if sd > 0. {
                x_j /= sd;
            }
        }
    }
}

impl ColumnStatOps for DMatrix<f64> {
    type Scalar = f64;
    type Mat = DMatrix<f64>;

    fn column_sums(&self) -> Vec<f64> {
        self.column_iter().map(|x_j| x_j.sum()).collect()
    }

    fn sum_columns_by_group(&self, membership: &[usize], num_groups: usize) -> Self::Mat {
        debug_assert_eq!(membership.len(), self.ncols());
        let mut ret = DMatrix::<f64>::zeros(self.nrows(), num_groups);
        for (x_j, &k) in self.column_iter().zip(membership) {
            let mut r_k = ret.column_mut(k);
            r_k += x_j;
        }
        ret
    }
}

impl ColumnStatOps for CscMatrix<f64> {
    type Scalar = f64;
    type Mat = DMatrix<f64>;

    fn column_sums(&self) -> Vec<f64> {
        self.col_iter()
            .map(|x_j| x_j.values().iter().sum::<f64>())
            .collect()
    }

    fn sum_columns_by_group(&self, membership: &[usize], num_groups: usize) -> Self::Mat {
        debug_assert_eq!(membership.len(), self.ncols());
        let mut ret = DMatrix::<f64>::zeros(self.nrows(), num_groups);
        for (x_j, &k) in self.col_iter().zip(membership) {
            for (&i, &x_ij) in x_j.row_indices().iter().zip(x_j.values()) {
                ret[(i, k)] += x_ij;
            }
        }
        ret
    }
}

impl SampleOps for DMatrix<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn runif<R: rand::Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat {
        DMatrix::<f64>::from_fn(dd, nn, |_, _| rng.random::<f64>())
    }

    fn rnorm<R: rand::Rng>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat {
        DMatrix::<f64>::from_fn(dd, nn, |_, _| rng.sample::<f64, _>(StandardNormal))
    }
}

/// Leave-one-group-out aggregation.
///
/// Given `rows x groups` sums, return `out[,k] = sum_{l != k} X[,l]`
/// computed as the grand total minus the group's own column.
pub fn leave_one_group_out(group_sums: &DMatrix<f64>) -> DMatrix<f64> {
    let total = group_sums.column_sum();
    let mut ret = group_sums.clone();
    for mut r_k in ret.column_iter_mut() {
        // total - own, never negative in exact arithmetic
        r_k.zip_apply(&total, |x, t| *x = (t - *x).max(0.));
    }
    ret
}

/// Build a sparse matrix from 0-based `(row, col, value)` triplets
/// (duplicates are summed)
pub fn csc_from_triplets(
    nrow: usize,
    ncol: usize,
    triplets: &[(usize, usize, f64)],
) -> anyhow::Result<CscMatrix<f64>> {
    let mut coo = CooMatrix::<f64>::new(nrow, ncol);
    for &(i, j, x_ij) in triplets {
        if i >= nrow || j >= ncol {
            return Err(anyhow::anyhow!(
                "triplet ({}, {}) out of bounds [{} x {}]",
                i,
                j,
                nrow,
                ncol
            ));
        }
        coo.push(i, j, x_ij);
    }
    Ok(CscMatrix::from(&coo))
}

/// Dense to sparse, keeping only strictly non-zero elements
pub fn csc_from_dense(xx: &DMatrix<f64>) -> CscMatrix<f64> {
    let mut coo = CooMatrix::<f64>::new(xx.nrows(), xx.ncols());
    for (j, x_j) in xx.column_iter().enumerate() {
        for (i, &x_ij) in x_j.iter().enumerate() {
            if x_ij != 0. {
                coo.push(i, j, x_ij);
            }
        }
    }
    CscMatrix::from(&coo)
}

/// Sparse to dense
pub fn csc_to_dense(xx: &CscMatrix<f64>) -> DMatrix<f64> {
    let mut ret = DMatrix::<f64>::zeros(xx.nrows(), xx.ncols());
    for (j, x_j) in xx.col_iter().enumerate() {
        for (&i, &x_ij) in x_j.row_indices().iter().zip(x_j.values()) {
            ret[(i, j)] = x_ij;
        }
    }
    ret
}

/// Sparse to 0-based triplets in column-major order
pub fn csc_to_triplets(xx: &CscMatrix<f64>) -> Vec<(usize, usize, f64)> {
    xx.col_iter()
        .enumerate()
        .flat_map(|(j, x_j)| {
            x_j.row_indices()
                .iter()
                .zip(x_j.values())
                .map(move |(&i, &x_ij)| (i, j, x_ij))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Select columns of a sparse matrix in the given order
pub fn csc_select_columns(xx: &CscMatrix<f64>, columns: &[usize]) -> CscMatrix<f64> {
    let mut coo = CooMatrix::<f64>::new(xx.nrows(), columns.len());
    for (new_j, &j) in columns.iter().enumerate() {
        let x_j = xx.col(j);
        for (&i, &x_ij) in x_j.row_indices().iter().zip(x_j.values()) {
            coo.push(i, new_j, x_ij);
        }
    }
    CscMatrix::from(&coo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn leave_one_out_is_total_minus_own() {
        let xx = DMatrix::from_row_slice(2, 3, &[1., 2., 3., 4., 5., 6.]);
        let yy = leave_one_group_out(&xx);
        assert_abs_diff_eq!(yy, DMatrix::from_row_slice(2, 3, &[5., 4., 3., 11., 10., 9.]));
    }

    #[test]
    fn dense_and_sparse_group_sums_agree() {
        let xx = DMatrix::from_row_slice(3, 4, &[1., 0., 2., 0., 0., 3., 0., 4., 5., 0., 0., 6.]);
        let membership = vec![0, 1, 0, 1];
        let sp = csc_from_dense(&xx);
        assert_abs_diff_eq!(
            xx.sum_columns_by_group(&membership, 2),
            sp.sum_columns_by_group(&membership, 2)
        );
        assert_eq!(xx.column_sums(), sp.column_sums());
        assert_abs_diff_eq!(csc_to_dense(&sp), xx);
    }
}
