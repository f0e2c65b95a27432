use approx::assert_abs_diff_eq;
use matrix_util::dmatrix_rsvd::RSVD;
use matrix_util::traits::SampleOps;
use nalgebra::DMatrix;
use rand::SeedableRng;

#[test]
fn dmatrix_rsvd_low_rank() -> anyhow::Result<()> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let aa = DMatrix::<f64>::rnorm(40, 2, &mut rng);
    let bb = DMatrix::<f64>::rnorm(2, 30, &mut rng);
    let xx = &aa * &bb;

    let (uu, dd, vv) = xx.rsvd(2, 42)?;

    assert_eq!(uu.ncols(), 2);
    assert_eq!(vv.ncols(), 2);
    assert_abs_diff_eq!(uu.transpose() * &uu, DMatrix::identity(2, 2), epsilon = 1e-8);

    let recon = &uu * DMatrix::from_diagonal(&dd) * vv.transpose();
    assert_abs_diff_eq!(recon, xx, epsilon = 1e-6);
    Ok(())
}

#[test]
fn dmatrix_rsvd_is_seeded() -> anyhow::Result<()> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let xx = DMatrix::<f64>::runif(20, 15, &mut rng);
    let (u1, d1, _) = xx.rsvd(3, 5)?;
    let (u2, d2, _) = xx.rsvd(3, 5)?;
    assert_eq!(u1, u2);
    assert_eq!(d1, d2);
    Ok(())
}
