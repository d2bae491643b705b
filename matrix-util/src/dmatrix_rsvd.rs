use crate::traits::SampleOps;
use nalgebra::{DMatrix, DVector};

type Mat = DMatrix<f32>;
type Vec = DVector<f32>;

pub trait RSVD {
    /// Rank-`rank` SVD `(U, D, V)` with a fixed random seed
    fn rsvd_seeded(&self, rank: usize, seed: u64) -> anyhow::Result<(Mat, Vec, Mat)>;
}

impl RSVD for Mat {
    fn rsvd_seeded(&self, rank: usize, seed: u64) -> anyhow::Result<(Mat, Vec, Mat)> {
        let default_iter = 5;
        let mut rsvd = RandomizedSVD::new(rank, default_iter).with_seed(seed);
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
/// Alg 4.4 of Halko et al. (2009): randomized subspace iteration with
/// a QR re-orthonormalization after every multiplication. The random
/// test matrix is drawn from `seed`, so the result is reproducible.
///
pub struct RandomizedSVD {
    max_rank: usize,
    iter: usize,
    seed: u64,
    u_vectors: Mat,
    singular_values: Vec,
    v_vectors: Mat,
}

impl RandomizedSVD {
    pub fn new(max_rank: usize, iter: usize) -> Self {
        Self {
            max_rank,
            iter,
            seed: 42,
            u_vectors: Mat::zeros(0, 0),
            singular_values: Vec::zeros(0),
            v_vectors: Mat::zeros(0, 0),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
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
        if rank == 0 {
            anyhow::bail!("empty matrix [{} x {}]", nr, nc);
        }

        let mut oversample = 0;
        if self.max_rank > 0 && rank > self.max_rank {
            rank = self.max_rank;
            oversample = 5.min(nr.min(nc) - rank);
        }

        let qq = self.rand_subspace_iteration(xx, rank + oversample);
        let bb = qq.transpose() * xx;

        let svd = bb.svd(true, true);

        if let (Some(svd_u), Some(svd_vt)) = (svd.u, svd.v_t) {
            let rank = rank.min(svd_u.ncols()).min(svd_vt.nrows());
            self.u_vectors = &qq * svd_u.columns(0, rank);
            self.v_vectors = svd_vt.rows(0, rank).transpose();
            self.singular_values = svd.singular_values.rows(0, rank).into_owned();
        } else {
            anyhow::bail!("SVD failed");
        }

        Ok(())
    }

    // Find an orthonormal matrix qq whose range approximates the range of xx
    fn rand_subspace_iteration(&self, xx: &Mat, rank_and_oversample: usize) -> Mat {
        let omega = Mat::rnorm_seeded(xx.ncols(), rank_and_oversample, self.seed);
        let mut qq = (xx * omega).qr().q();

        for _ in 0..self.iter {
            let zz = (xx.transpose() * &qq).qr().q();
            qq = (xx * zz).qr().q();
        }
        qq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn recovers_a_low_rank_matrix() -> anyhow::Result<()> {
        let uu = Mat::rnorm_seeded(30, 2, 1);
        let vv = Mat::rnorm_seeded(20, 2, 2);
        let xx = &uu * vv.transpose();

        let (u, d, v) = xx.rsvd_seeded(2, 3)?;
        assert_eq!(u.shape(), (30, 2));
        assert_eq!(v.shape(), (20, 2));
        assert!(d[0] >= d[1]);

        let xx_hat = &u * Mat::from_diagonal(&d) * v.transpose();
        assert_abs_diff_eq!((xx - xx_hat).norm(), 0.0, epsilon = 1e-2);
        Ok(())
    }

    #[test]
    fn same_seed_same_answer() -> anyhow::Result<()> {
        let xx = Mat::runif_seeded(15, 12, 5);
        let (u1, _, _) = xx.rsvd_seeded(3, 11)?;
        let (u2, _, _) = xx.rsvd_seeded(3, 11)?;
        assert_eq!(u1, u2);
        Ok(())
    }
}
