use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

impl MatOps for DMatrix<f32> {
    type Mat = Self;
    type Scalar = f32;

    fn cosine_normalize_columns_inplace(&mut self) {
        for mut xx_j in self.column_iter_mut() {
            let denom = xx_j.norm();
            if denom > 0.0 {
                xx_j /= denom;
            }
        }
    }

    fn cosine_normalize_columns(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.cosine_normalize_columns_inplace();
        ret
    }

    fn centre_rows_inplace(&mut self) {
        if self.ncols() == 0 {
            return;
        }
        let nn = self.ncols() as f32;
        for mut xx_i in self.row_iter_mut() {
            let mu = xx_i.sum() / nn;
            xx_i.add_scalar_mut(-mu);
        }
    }

    fn centre_rows(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.centre_rows_inplace();
        ret
    }

    fn subset_rows(&self, rows: &[usize]) -> Self::Mat {
        self.select_rows(rows.iter())
    }
}

impl SampleOps for DMatrix<f32> {
    type Mat = Self;

    fn runif_seeded(dd: usize, nn: usize, seed: u64) -> Self::Mat {
        let mut rng = StdRng::seed_from_u64(seed);
        DMatrix::<f32>::from_fn(dd, nn, |_, _| rng.random::<f32>())
    }

    fn rnorm_seeded(dd: usize, nn: usize, seed: u64) -> Self::Mat {
        let mut rng = StdRng::seed_from_u64(seed);
        DMatrix::<f32>::from_fn(dd, nn, |_, _| rng.sample::<f32, _>(StandardNormal))
    }
}

impl DistanceOps for DMatrix<f32> {
    type Scalar = f32;
    type Other = Self;

    fn column_sq_distance(&self, i: usize, other: &Self::Other, j: usize) -> f32 {
        self.column(i)
            .iter()
            .zip(other.column(j).iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
    }
}

/// Concatenate matrices with the same number of rows column-wise
/// * `blocks` - `d x n_1`, `d x n_2`, ... matrices
pub fn concatenate_columns(blocks: &[&DMatrix<f32>]) -> anyhow::Result<DMatrix<f32>> {
    let nrows = match blocks.first() {
        Some(x) => x.nrows(),
        None => return Ok(DMatrix::<f32>::zeros(0, 0)),
    };

    if blocks.iter().any(|x| x.nrows() != nrows) {
        anyhow::bail!("all blocks must have {} rows", nrows);
    }

    let ntot = blocks.iter().map(|x| x.ncols()).sum::<usize>();
    let mut ret = DMatrix::<f32>::zeros(nrows, ntot);
    let mut offset = 0;
    for x in blocks {
        ret.view_mut((0, offset), (nrows, x.ncols())).copy_from(*x);
        offset += x.ncols();
    }
    Ok(ret)
}

/// Sum over rows of the (population) variance of each row across
/// columns. This is the total variance of the column cloud around
/// its centroid.
pub fn total_row_variance(xx: &DMatrix<f32>) -> f64 {
    let nn = xx.ncols();
    if nn == 0 {
        return 0.0;
    }
    xx.row_iter()
        .map(|row| {
            let mu = row.iter().map(|&x| x as f64).sum::<f64>() / nn as f64;
            row.iter()
                .map(|&x| {
                    let d = x as f64 - mu;
                    d * d
                })
                .sum::<f64>()
                / nn as f64
        })
        .sum()
}
