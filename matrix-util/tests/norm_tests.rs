use approx::assert_abs_diff_eq;
use matrix_util::dmatrix_util::*;
use matrix_util::traits::{ColumnStatOps, MatOps, SampleOps};
use rand::SeedableRng;

#[test]
fn sum_to_one_columns_test() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(3);
    let mut xx = DMatrix::<f64>::runif(100, 10, &mut rng);
    xx.column_mut(3).fill(0.);
    xx.sum_to_one_columns_inplace(1e-20);

    for s in xx.column_sums() {
        assert_abs_diff_eq!(s, 1.0, epsilon = 1e-10);
    }
    // an empty column becomes uniform
    assert_abs_diff_eq!(xx[(0, 3)], 0.01, epsilon = 1e-10);
}

#[test]
fn scale_columns_test() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(4);
    let mut xx = DMatrix::<f64>::rnorm(200, 5, &mut rng) * 3.0;
    xx.scale_columns_inplace();
    for x_j in xx.column_iter() {
        assert_abs_diff_eq!(x_j.mean(), 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(x_j.variance() * 200. / 199., 1.0, epsilon = 1e-8);
    }
}
