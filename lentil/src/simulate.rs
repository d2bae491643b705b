use crate::common::*;
use crate::dataset::{Dataset, ValueScale};
use crate::merge_order::BatchPriority;
use indicatif::ParallelProgressIterator;
use matrix_util::traits::SampleOps;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};
use rayon::prelude::*;

pub struct SimArgs {
    /// number of features (genes)
    pub features: usize,
    /// number of cells in each batch
    pub batch_sizes: Vec<usize>,
    /// number of cell types shared by all batches
    pub cell_types: usize,
    /// expected total count per cell
    pub depth: usize,
    /// spread of log cell-type profiles around the baseline
    pub type_sd: f32,
    /// spread of log batch effects
    pub batch_sd: f32,
    pub rseed: u64,
}

impl Default for SimArgs {
    fn default() -> Self {
        Self {
            features: 200,
            batch_sizes: vec![50, 80, 30],
            cell_types: 4,
            depth: 2000,
            type_sd: 1.0,
            batch_sd: 0.3,
            rseed: DEFAULT_SEED,
        }
    }
}

pub struct SimOut {
    /// count data of each batch
    pub batches: BatchMap<Dataset>,
    /// cell type of each cell, per batch
    pub cell_types: BatchMap<Vec<usize>>,
    /// `features x batches` log multiplicative batch effects
    pub ln_delta_db: Mat,
    /// `features x types` log cell-type profiles
    pub ln_profile_dk: Mat,
}

impl SimOut {
    /// Every batch at rank 1 with its size, so larger batches go first
    pub fn priority(&self) -> BatchMap<BatchPriority> {
        self.batches
            .iter()
            .map(|(b, d)| {
                (
                    b.clone(),
                    BatchPriority {
                        rank: 1,
                        size: d.num_cells(),
                    },
                )
            })
            .collect()
    }
}

pub fn batch_name(b: usize) -> Box<str> {
    format!("batch{}", b + 1).into_boxed_str()
}

/// Simulate batches of counts over shared cell types
///
/// ```text
/// Y(i,j) ~ Poisson( s(j) * exp( base(i) + profile(i, T(j)) + delta(i, B(j)) ) )
/// ```
///
/// `T(j)` is drawn uniformly from the cell types and `s(j)` scales the
/// expected library size of every cell to `depth`.
pub fn simulate_batches(args: &SimArgs) -> anyhow::Result<SimOut> {
    let dd = args.features;
    let kk = args.cell_types;
    let bb = args.batch_sizes.len();

    if dd == 0 || kk == 0 || bb == 0 {
        anyhow::bail!(
            "need features ({}), cell types ({}) and batches ({})",
            dd,
            kk,
            bb
        );
    }

    let rseed = args.rseed;
    let ln_base_d = Mat::rnorm_seeded(dd, 1, rseed);
    let ln_profile_dk = Mat::rnorm_seeded(dd, kk, rseed + 1) * args.type_sd;
    let ln_delta_db = Mat::rnorm_seeded(dd, bb, rseed + 2) * args.batch_sd;

    let features: Vec<Box<str>> = (0..dd).map(|i| format!("gene{}", i).into()).collect();

    let mut rng = rand::rngs::StdRng::seed_from_u64(rseed + 3);
    let mut batches = BatchMap::new();
    let mut cell_types = BatchMap::new();
    let mut offset = 0_u64;

    for (b, &nn) in args.batch_sizes.iter().enumerate() {
        let batch = batch_name(b);
        let types: Vec<usize> = (0..nn).map(|_| rng.random_range(0..kk)).collect();

        let columns = types
            .par_iter()
            .enumerate()
            .progress_count(nn as u64)
            .map(|(j, &k)| {
                let mut rng = rand::rngs::StdRng::seed_from_u64(rseed + offset + j as u64);
                let ln_lambda = &ln_base_d.column(0) + ln_profile_dk.column(k) + ln_delta_db.column(b);
                let lambda = ln_lambda.map(|x| x.exp());
                let scale = args.depth as f32 / lambda.sum();

                let mut y = DVec::zeros(dd);
                for (y_i, &l_i) in y.iter_mut().zip(lambda.iter()) {
                    let l_i = (l_i * scale).max(1e-8);
                    *y_i = Poisson::new(l_i)
                        .map(|pois| pois.sample(&mut rng))
                        .unwrap_or(0.0);
                }
                // keep every cell non-empty
                if y.sum() <= 0.0 {
                    y[lambda.imax()] = 1.0;
                }
                y
            })
            .collect::<Vec<_>>();

        let counts = if columns.is_empty() {
            Mat::zeros(dd, 0)
        } else {
            Mat::from_columns(&columns)
        };
        let cells = (0..nn).map(|j| format!("{}_{}", batch, j).into()).collect();

        batches.insert(
            batch.clone(),
            Dataset::new(&batch, features.clone(), cells, counts, ValueScale::Counts)?,
        );
        cell_types.insert(batch.clone(), types);
        offset += nn as u64;

        info!("simulated {} cells of {}", nn, batch);
    }

    Ok(SimOut {
        batches,
        cell_types,
        ln_delta_db,
        ln_profile_dk,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_and_seeds_are_respected() -> anyhow::Result<()> {
        let args = SimArgs {
            features: 30,
            batch_sizes: vec![5, 7],
            ..Default::default()
        };
        let sim = simulate_batches(&args)?;
        assert_eq!(sim.batches.len(), 2);
        assert_eq!(sim.batches["batch1"].num_cells(), 5);
        assert_eq!(sim.batches["batch2"].num_cells(), 7);
        assert_eq!(sim.batches["batch2"].num_features(), 30);

        for data in sim.batches.values() {
            for col in data.values().column_iter() {
                assert!(col.sum() > 0.0);
            }
        }

        let again = simulate_batches(&args)?;
        assert_eq!(sim.batches["batch2"].values(), again.batches["batch2"].values());
        Ok(())
    }
}
