use crate::common::*;
use crate::dataset::{Annotations, Dataset};
use crate::merge_order::MergeOrder;
use crate::mnn::{PairInput, PairwiseCorrector};
use matrix_util::dmatrix_util::concatenate_columns;
use matrix_util::traits::MatOps;
use serde::Serialize;
use std::ops::Range;

/// What happened when one batch was merged into the reference
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MergeStepRecord {
    /// 1 for the second batch in the merge order, and so on
    pub step: usize,
    pub batch: Box<str>,
    pub n_cells: usize,
    /// reference cells before this batch was added
    pub n_reference_cells: usize,
    pub n_pairs: usize,
    pub lost_variance: f64,
}

/// All batches after ordered correction
///
/// Cells follow the merge order. `dataset.values()` are the values as
/// given and `dataset.reduced("corrected")` the corrected values of
/// every feature.
#[derive(Clone, Debug)]
pub struct CorrectedDataset {
    pub dataset: Dataset,
    pub merge_order: MergeOrder,
    pub steps: Vec<MergeStepRecord>,
    /// features used to find neighbours
    pub selected: Vec<Box<str>>,
    /// column range of each batch, in merge order
    pub batch_ranges: Vec<(Box<str>, Range<usize>)>,
}

impl CorrectedDataset {
    pub fn corrected(&self) -> Option<&Mat> {
        self.dataset.reduced(CORRECTED)
    }

    /// `(step, batch, fraction)` for every batch after the first
    pub fn lost_variance(&self) -> Vec<(usize, &str, f64)> {
        self.steps
            .iter()
            .map(|x| (x.step, x.batch.as_ref(), x.lost_variance))
            .collect()
    }

    /// Corrected values of one batch
    pub fn corrected_batch(&self, batch: &str) -> Option<Mat> {
        let corrected = self.corrected()?;
        self.batch_ranges
            .iter()
            .find(|(b, _)| b.as_ref() == batch)
            .map(|(_, r)| corrected.columns(r.start, r.len()).into_owned())
    }

    /// Merge step of each cell; cells of the first batch get 0
    pub fn cell_merge_steps(&self) -> Vec<usize> {
        let mut ret = vec![0; self.dataset.num_cells()];
        for (step, (_, range)) in self.batch_ranges.iter().enumerate() {
            ret[range.clone()].fill(step);
        }
        ret
    }

    pub fn lost_variance_lines(&self) -> Vec<Box<str>> {
        let mut ret: Vec<Box<str>> = vec!["step\tbatch\tn_cells\tn_reference_cells\tn_pairs\tlost_variance".into()];
        ret.extend(self.steps.iter().map(|x| {
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}",
                x.step, x.batch, x.n_cells, x.n_reference_cells, x.n_pairs, x.lost_variance
            )
            .into_boxed_str()
        }));
        ret
    }
}

/// Merge batches one at a time into a growing reference
///
/// * `datasets` - harmonized batches, all over the same features
/// * `order` - every batch exactly once; the first is the seed of the
///   reference and is never changed
/// * `selected` - features to find neighbours with
/// * `corrector` - computes the correction of one batch
///
/// Everything about the inputs is checked before the first merge
/// step. The inputs are left as they are.
pub fn correct<C>(
    datasets: &BatchMap<Dataset>,
    order: &MergeOrder,
    selected: &[Box<str>],
    corrector: &C,
) -> Result<CorrectedDataset>
where
    C: PairwiseCorrector + ?Sized,
{
    if datasets.is_empty() {
        return Err(IntegrationError::NoDatasets);
    }

    order.validate_against(datasets.keys())?;

    if selected.is_empty() {
        return Err(IntegrationError::EmptyFeatureSet);
    }

    let ordered: Vec<(&Box<str>, &Dataset)> = order
        .iter()
        .map(|b| (b, &datasets[b]))
        .collect();

    let (first_batch, first) = ordered[0];
    for &(batch, data) in ordered.iter().skip(1) {
        if data.features() != first.features() {
            return Err(IntegrationError::FeatureMismatch {
                batch: batch.clone(),
                reference: first_batch.clone(),
            });
        }
        if data.scale() != first.scale() {
            return Err(IntegrationError::invalid_dataset(
                batch,
                format!("values are {:?}, '{}' has {:?}", data.scale(), first_batch, first.scale()),
            ));
        }
    }

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let selected: Vec<Box<str>> = selected
        .iter()
        .filter(|&x| seen.insert(x.as_ref()))
        .cloned()
        .collect();
    let rows = first.feature_positions(&selected)?;

    let uncorrected = concatenate_uncorrected(&ordered)?;

    let mut offset = 0;
    let batch_ranges = ordered
        .iter()
        .map(|&(batch, data)| {
            let range = offset..(offset + data.num_cells());
            offset = range.end;
            (batch.clone(), range)
        })
        .collect();

    let mut reference_full = first.values().clone();
    let mut reference_sel = reference_full.subset_rows(&rows);
    let mut steps = Vec::with_capacity(ordered.len().saturating_sub(1));

    info!(
        "seeding the reference with '{}' ({} cells)",
        first_batch,
        first.num_cells()
    );

    for (step, &(batch, data)) in ordered.iter().enumerate().skip(1) {
        let target_full = data.values();
        let target_sel = target_full.subset_rows(&rows);

        let input = PairInput {
            step,
            batch: batch.as_ref(),
            reference_selected: &reference_sel,
            target_selected: &target_sel,
            reference_full: &reference_full,
            target_full,
        };

        let out = corrector.correct_pair(&input)?;
        check_correction(step, batch, target_full, &out.correction, out.lost_variance)?;
        if out.pairs.is_empty() {
            return Err(IntegrationError::InsufficientNeighbours {
                step,
                batch: batch.clone(),
            });
        }

        let corrected = target_full + &out.correction;
        let corrected_sel = corrected.subset_rows(&rows);

        steps.push(MergeStepRecord {
            step,
            batch: batch.clone(),
            n_cells: data.num_cells(),
            n_reference_cells: reference_full.ncols(),
            n_pairs: out.pairs.len(),
            lost_variance: out.lost_variance,
        });

        reference_full = concat(&[&reference_full, &corrected])?;
        reference_sel = concat(&[&reference_sel, &corrected_sel])?;

        debug!(
            "step {}: reference now has {} cells",
            step,
            reference_full.ncols()
        );
    }

    info!(
        "merged {} batches into {} cells",
        ordered.len(),
        reference_full.ncols()
    );

    Ok(CorrectedDataset {
        dataset: uncorrected.with_reduced(CORRECTED, reference_full)?,
        merge_order: order.clone(),
        steps,
        selected,
        batch_ranges,
    })
}

fn check_correction(
    step: usize,
    batch: &str,
    target: &Mat,
    correction: &Mat,
    lost_variance: f64,
) -> Result<()> {
    let invalid = |reason: String| IntegrationError::InvalidCorrection {
        step,
        batch: batch.into(),
        reason,
    };
    if correction.shape() != target.shape() {
        return Err(invalid(format!(
            "correction is {:?}, expected {:?}",
            correction.shape(),
            target.shape()
        )));
    }
    if correction.iter().any(|x| !x.is_finite()) {
        return Err(invalid("non-finite correction".into()));
    }
    if !lost_variance.is_finite() {
        return Err(invalid(format!("lost variance is {}", lost_variance)));
    }
    Ok(())
}

/// Cells of all batches in merge order, labelled by batch, with their
/// values as given and their annotations
fn concatenate_uncorrected(ordered: &[(&Box<str>, &Dataset)]) -> Result<Dataset> {
    let (_, first) = ordered[0];
    let blocks: Vec<&Mat> = ordered.iter().map(|(_, d)| d.values()).collect();
    let values = concat(&blocks)?;

    let mut cells = Vec::with_capacity(values.ncols());
    let mut cell_batches = Vec::with_capacity(values.ncols());
    let mut meta: BTreeMap<Box<str>, Annotations> = BTreeMap::new();
    for &(batch, data) in ordered.iter() {
        cells.extend(data.cells().iter().cloned());
        cell_batches.extend(std::iter::repeat(batch.clone()).take(data.num_cells()));
        meta.extend(
            data.cell_metadata()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }

    Dataset::from_parts(
        CORRECTED,
        first.features().to_vec(),
        cells,
        cell_batches,
        values,
        first.scale(),
    )?
    .with_cell_metadata(meta)
}

fn concat(blocks: &[&Mat]) -> Result<Mat> {
    concatenate_columns(blocks).map_err(|e| IntegrationError::Numerical(e.to_string()))
}
