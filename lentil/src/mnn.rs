use crate::common::*;
use matrix_util::dmatrix_util::total_row_variance;
use matrix_util::knn_match::{mutual_nearest_pairs, KnnSearch};
use matrix_util::traits::{DistanceOps, MatOps};
use rayon::prelude::*;

/// What a corrector sees at one merge step
///
/// `*_selected` hold the rows of the selected features, `*_full` hold
/// every feature; columns are cells.
pub struct PairInput<'a> {
    pub step: usize,
    pub batch: &'a str,
    pub reference_selected: &'a Mat,
    pub target_selected: &'a Mat,
    pub reference_full: &'a Mat,
    pub target_full: &'a Mat,
}

/// What a corrector hands back for one merge step
#[derive(Clone, Debug)]
pub struct PairCorrection {
    /// `(reference cell, target cell)`, sorted by target then reference
    pub pairs: Vec<(usize, usize)>,
    /// `features x target cells`, added to the target values
    pub correction: Mat,
    /// fraction of the target's variance removed by the correction
    pub lost_variance: f64,
}

/// Corrects one batch against the running reference
pub trait PairwiseCorrector: Sync {
    fn correct_pair(&self, input: &PairInput) -> Result<PairCorrection>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighbourSearch {
    Exact,
    Hnsw,
}

#[derive(Clone, Debug)]
pub struct MnnConfig {
    /// neighbours looked up in each direction
    pub knn: usize,
    /// bandwidth of the Gaussian kernel on squared distances
    pub sigma: f32,
    /// cosine-normalize cells before the neighbour search
    pub cos_norm: bool,
    pub search: NeighbourSearch,
    /// seed of the HNSW graph
    pub seed: u64,
}

impl Default for MnnConfig {
    fn default() -> Self {
        Self {
            knn: DEFAULT_KNN,
            sigma: DEFAULT_SIGMA,
            cos_norm: true,
            search: NeighbourSearch::Exact,
            seed: DEFAULT_SEED,
        }
    }
}

/// Mutual nearest neighbour correction (Haghverdi et al. 2018)
///
/// Each mutual pair gives a vector from the target cell to its
/// reference partner. Vectors are averaged per paired target cell and
/// every target cell moves by the Gaussian-kernel weighted mean of
/// those averages, weights taken from distances between target cells.
#[derive(Clone, Debug, Default)]
pub struct MnnCorrector {
    pub config: MnnConfig,
}

impl MnnCorrector {
    pub fn new(config: MnnConfig) -> Self {
        Self { config }
    }

    fn search(&self) -> KnnSearch {
        match self.config.search {
            NeighbourSearch::Exact => KnnSearch::Exact,
            NeighbourSearch::Hnsw => KnnSearch::Hnsw {
                seed: self.config.seed,
            },
        }
    }
}

impl PairwiseCorrector for MnnCorrector {
    fn correct_pair(&self, input: &PairInput) -> Result<PairCorrection> {
        let config = &self.config;
        if config.knn == 0 {
            return Err(IntegrationError::Numerical("knn must be at least 1".into()));
        }
        if !(config.sigma > 0.0 && config.sigma.is_finite()) {
            return Err(IntegrationError::Numerical(format!(
                "sigma must be positive, got {}",
                config.sigma
            )));
        }

        check_input(input)?;

        let (refs, target) = if config.cos_norm {
            (
                input.reference_selected.cosine_normalize_columns(),
                input.target_selected.cosine_normalize_columns(),
            )
        } else {
            (
                input.reference_selected.clone(),
                input.target_selected.clone(),
            )
        };

        let search = self.search();
        let numerical = |e: anyhow::Error| IntegrationError::Numerical(e.to_string());
        let ref_to_target = search.search(&refs, &target, config.knn).map_err(numerical)?;
        let target_to_ref = search.search(&target, &refs, config.knn).map_err(numerical)?;
        let pairs = mutual_nearest_pairs(&ref_to_target, &target_to_ref);

        if pairs.is_empty() {
            return Err(IntegrationError::InsufficientNeighbours {
                step: input.step,
                batch: input.batch.into(),
            });
        }

        let (paired, vectors) = average_pair_vectors(&pairs, input.reference_full, input.target_full);
        let correction = smooth_correction(&target, &paired, &vectors, config.sigma);

        let corrected = input.target_full + &correction;
        let lost_variance = lost_variance_fraction(input.target_full, &corrected);

        info!(
            "step {}: {} mutual pairs cover {} of {} cells in '{}', lost variance {:.4}",
            input.step,
            pairs.len(),
            paired.len(),
            input.target_full.ncols(),
            input.batch,
            lost_variance
        );

        Ok(PairCorrection {
            pairs,
            correction,
            lost_variance,
        })
    }
}

fn check_input(input: &PairInput) -> Result<()> {
    let invalid = |reason: String| IntegrationError::InvalidCorrection {
        step: input.step,
        batch: input.batch.into(),
        reason,
    };
    if input.reference_selected.nrows() != input.target_selected.nrows()
        || input.reference_full.nrows() != input.target_full.nrows()
    {
        return Err(invalid("reference and target features differ".into()));
    }
    if input.reference_selected.ncols() != input.reference_full.ncols()
        || input.target_selected.ncols() != input.target_full.ncols()
    {
        return Err(invalid("selected and full matrices differ in cells".into()));
    }
    if input.reference_full.ncols() == 0 || input.target_full.ncols() == 0 {
        return Err(IntegrationError::InsufficientNeighbours {
            step: input.step,
            batch: input.batch.into(),
        });
    }
    Ok(())
}

/// Average of `reference - target` over the pairs of each paired
/// target cell
///
/// Returns the paired target cells in increasing order and the matching
/// `features x paired` matrix of averaged vectors.
pub fn average_pair_vectors(
    pairs: &[(usize, usize)],
    reference: &Mat,
    target: &Mat,
) -> (Vec<usize>, Mat) {
    let mut by_target: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &(r, t) in pairs {
        by_target.entry(t).or_default().push(r);
    }

    let paired: Vec<usize> = by_target.keys().copied().collect();
    let mut vectors = Mat::zeros(target.nrows(), paired.len());

    for (mut v_k, (&t, refs)) in vectors.column_iter_mut().zip(by_target.iter()) {
        for &r in refs {
            v_k += reference.column(r);
        }
        v_k /= refs.len() as f32;
        v_k -= target.column(t);
    }
    (paired, vectors)
}

/// Gaussian-kernel weighted mean of the averaged vectors for each
/// target cell, `exp(-(d^2 - d_min^2) / sigma)` with squared distances
/// `d^2` measured in `space` from the cell to each paired cell
pub fn smooth_correction(space: &Mat, paired: &[usize], vectors: &Mat, sigma: f32) -> Mat {
    let columns: Vec<DVec> = (0..space.ncols())
        .into_par_iter()
        .map(|j| {
            let d2: Vec<f32> = paired
                .iter()
                .map(|&t| space.column_sq_distance(j, space, t))
                .collect();
            let d2_min = d2.iter().copied().fold(f32::INFINITY, f32::min);
            let weights: Vec<f32> = d2.iter().map(|&d| (-(d - d2_min) / sigma).exp()).collect();
            let denom: f32 = weights.iter().sum();

            let mut ret = DVec::zeros(vectors.nrows());
            for (w, v) in weights.iter().zip(vectors.column_iter()) {
                ret.axpy(*w / denom, &v, 1.0);
            }
            ret
        })
        .collect();

    if columns.is_empty() {
        Mat::zeros(vectors.nrows(), 0)
    } else {
        Mat::from_columns(&columns)
    }
}

/// `(V_before - V_after) / V_before` clamped to `[0, 1]`, where `V` is
/// the summed per-feature variance across cells; zero if there was no
/// variance to lose
pub fn lost_variance_fraction(before: &Mat, after: &Mat) -> f64 {
    let v_before = total_row_variance(before);
    if v_before <= 0.0 {
        return 0.0;
    }
    let v_after = total_row_variance(after);
    ((v_before - v_after) / v_before).clamp(0.0, 1.0)
}
