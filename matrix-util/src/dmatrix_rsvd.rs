use crate::traits::SampleOps;
use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;

type Mat = DMatrix<f64>;
type Vec = DVector<f64>;

pub trait RSVD {
    /// Randomized SVD `X ~ U * diag(d) * V'` with a seeded sketch
    fn rsvd(&self, rank: usize, seed: u64) -> anyhow::Result<(Mat, Vec, Mat)>;
}

impl RSVD for Mat {
    fn rsvd(&self, rank: usize, seed: u64) -> anyhow::Result<(Mat, Vec, Mat)> {
        let default_iter = 5;
        let mut rsvd = RandomizedSVD::new(rank, default_iter, seed);
        rsvd.compute(self)?;
        Ok((
            rsvd.matrix_u().clone(),
            rsvd.singular_values().clone(),
            rsvd.matrix_v().clone(),
        ))
    }
}

/// Randomized SVD
///
/// Implement Alg 4.4 of Halko et al. (2009) with QR-normalized
/// subspace iterations.
///
pub struct RandomizedSVD {
    max_rank: usize,
    iter: usize,
    seed: u64,
    u_vectors: Mat,
    singular_values: Vec,
    v_vectors: Mat,
    qq: Mat,
}

impl RandomizedSVD {
    pub fn new(max_rank: usize, iter: usize, seed: u64) -> Self {
        Self {
            max_rank,
            iter,
            seed,
            u_vectors: Mat::zeros(0, 0),
            singular_values: Vec::zeros(0),
            v_vectors: Mat::zeros(0, 0),
            qq: Mat::zeros(0, 0),
        }
    }

    pub fn matrix_u(&self) -> &Mat {
        &self.u_vectors
    }

    pub fn matrix_v(&self) -> &Mat {
        &self.v_vectors
    }

    pub fn singular_values(&self) -> &Vec {
        &self.singular_values
    }

    pub fn compute(&mut self, xx: &Mat) -> anyhow::Result<()> {
        let nr = xx.nrows();
        let nc = xx.ncols();

        let mut rank = nr.min(nc);
        let mut oversample = 0;

        if rank == 0 {
            anyhow::bail!("empty matrix [{} x {}]", nr, nc);
        }

        if self.max_rank > 0 && rank > self.max_rank {
            rank = self.max_rank;
            oversample = 5.min(nr.min(nc) - rank);
        }

        self.rand_subspace_iteration(xx, rank + oversample);

        let rank = rank.min(self.qq.ncols());
        self.qq = self.qq.columns(0, rank).into_owned();

        let bb = self.qq.transpose() * xx;
        let svd = bb.svd(true, true);

        if let (Some(svd_u), Some(svd_vt)) = (svd.u, svd.v_t) {
            let rank = rank.min(svd_u.ncols()).min(svd_vt.nrows());
            self.u_vectors = &self.qq * svd_u.columns(0, rank);
            self.v_vectors = svd_vt.transpose().columns(0, rank).into_owned();
            self.singular_values = svd.singular_values.rows(0, rank).into_owned();
        } else {
            anyhow::bail!("SVD failed");
        }

        Ok(())
    }

    // Find an orthonormal matrix qq whose range approximates the range of xx
    fn rand_subspace_iteration(&mut self, xx: &Mat, rank_and_oversample: usize) {
        let nc = xx.ncols();

        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed);
        let mut qq = Mat::rnorm(nc, rank_and_oversample, &mut rng);

        // re-orthonormalize after each power step
        for _ in 0..self.iter {
            let q1 = (xx * &qq).qr().q();
            qq = (xx.transpose() * &q1).qr().q();
        }

        let qr = (xx * &qq).qr();
        let kk = rank_and_oversample.min(qr.q().ncols());
        self.qq = qr.q().columns(0, kk).into_owned();
    }
}
