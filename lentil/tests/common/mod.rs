#![allow(dead_code)]

use lentil::common::*;
use lentil::dataset::{Dataset, ValueScale};
use lentil::mnn::{PairCorrection, PairInput, PairwiseCorrector};
use lentil::variance::{FeatureVariance, VarianceDecomposition, VarianceModel};
use matrix_util::traits::SampleOps;
use std::sync::Mutex;

pub fn feature_names(n: usize) -> Vec<Box<str>> {
    (0..n).map(|i| format!("f{:04}", i).into_boxed_str()).collect()
}

/// Log-expression batch with random values
pub fn log_batch(batch: &str, features: Vec<Box<str>>, ncells: usize, seed: u64) -> Dataset {
    let values = Mat::rnorm_seeded(features.len(), ncells, seed).map(|x| x + 2.0);
    let cells = (0..ncells)
        .map(|j| format!("{}_{}", batch, j).into_boxed_str())
        .collect();
    Dataset::new(batch, features, cells, values, ValueScale::LogExpression).unwrap()
}

pub fn batch_map(datasets: Vec<Dataset>) -> BatchMap<Dataset> {
    datasets
        .into_iter()
        .map(|d| (Box::<str>::from(d.name()), d))
        .collect()
}

/// Every feature gets `bio` from the table (1 if absent) and FDR 0
pub struct FakeVarianceModel {
    pub bio: BTreeMap<Box<str>, f64>,
}

impl FakeVarianceModel {
    pub fn flat() -> Self {
        Self {
            bio: BTreeMap::new(),
        }
    }
}

impl VarianceModel for FakeVarianceModel {
    fn decompose(&self, features: &[Box<str>], logexpr: &Mat) -> Result<VarianceDecomposition> {
        let stats = features
            .iter()
            .map(|f| {
                let bio = self.bio.get(f).copied().unwrap_or(1.0);
                FeatureVariance {
                    mean: 0.0,
                    total: bio + 1.0,
                    tech: 1.0,
                    bio,
                    p_value: 0.0,
                    fdr: 0.0,
                }
            })
            .collect();
        VarianceDecomposition::new(features.to_vec(), stats, logexpr.ncols())
    }
}

/// What the corrector saw at one step
#[derive(Clone, Debug, PartialEq)]
pub struct SeenStep {
    pub step: usize,
    pub batch: String,
    pub n_reference: usize,
    pub n_target: usize,
    pub n_selected: usize,
}

/// Shifts every target value by `shift` and records its inputs
pub struct FakeCorrector {
    pub shift: f32,
    pub with_pairs: bool,
    pub seen: Mutex<Vec<SeenStep>>,
}

impl FakeCorrector {
    pub fn new(shift: f32) -> Self {
        Self {
            shift,
            with_pairs: true,
            seen: Mutex::new(vec![]),
        }
    }

    pub fn without_pairs() -> Self {
        Self {
            with_pairs: false,
            ..Self::new(0.0)
        }
    }

    pub fn seen(&self) -> Vec<SeenStep> {
        self.seen.lock().unwrap().clone()
    }
}

impl PairwiseCorrector for FakeCorrector {
    fn correct_pair(&self, input: &PairInput) -> Result<PairCorrection> {
        self.seen.lock().unwrap().push(SeenStep {
            step: input.step,
            batch: input.batch.to_string(),
            n_reference: input.reference_full.ncols(),
            n_target: input.target_full.ncols(),
            n_selected: input.target_selected.nrows(),
        });
        let (nr, nc) = input.target_full.shape();
        Ok(PairCorrection {
            pairs: if self.with_pairs { vec![(0, 0)] } else { vec![] },
            correction: Mat::from_element(nr, nc, self.shift),
            lost_variance: 0.25,
        })
    }
}
