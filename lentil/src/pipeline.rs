use crate::combine_var::combine_batches;
use crate::common::*;
use crate::correct::{correct, CorrectedDataset};
use crate::dataset::{AnnotValue, Dataset, ValueScale};
use crate::feature_selection::{select_features, select_top_features, Blacklist};
use crate::harmonize::harmonize;
use crate::merge_order::{compute_merge_order, BatchPriority, MergeOrder};
use crate::mnn::{MnnConfig, MnnCorrector, PairwiseCorrector};
use crate::normalize::multi_batch_log_normalize;
use crate::pca::add_corrected_pca;
use crate::variance::{
    estimate_variance_per_batch, FeatureVariance, TrendVarianceModel, VarianceDecomposition,
    VarianceModel,
};

#[derive(Clone, Debug)]
pub struct IntegrationParams {
    /// added before taking log2 of normalized counts
    pub pseudocount: f32,
    /// keep features with biological variance above this
    pub bio_threshold: f64,
    /// keep features with FDR below this
    pub fdr_threshold: f64,
    /// keep at most this many features
    pub n_top: Option<usize>,
    pub variance: TrendVarianceModel,
    pub mnn: MnnConfig,
    /// principal components of the corrected values, if any
    pub n_pcs: Option<usize>,
    /// principal components over the selected features only
    pub pca_selected_only: bool,
}

impl Default for IntegrationParams {
    fn default() -> Self {
        Self {
            pseudocount: 1.0,
            bio_threshold: 0.0,
            fdr_threshold: 0.05,
            n_top: None,
            variance: TrendVarianceModel::default(),
            mnn: MnnConfig::default(),
            n_pcs: None,
            pca_selected_only: true,
        }
    }
}

pub struct IntegrationOutput {
    pub corrected: CorrectedDataset,
    pub combined: VarianceDecomposition,
    pub per_batch: BatchMap<VarianceDecomposition>,
    pub selected: Vec<Box<str>>,
    pub order: MergeOrder,
}

/// Integrate batches with the default variance model and MNN corrector
///
/// * `datasets` - batch id -> counts or log-expression
/// * `priority` - rank and size of every reference batch
/// * `query` - batch to merge last, not listed in `priority`
/// * `blacklist` - features never used to find neighbours
pub fn run_integration(
    datasets: &BatchMap<Dataset>,
    priority: &BatchMap<BatchPriority>,
    query: Option<&str>,
    blacklist: &Blacklist,
    params: &IntegrationParams,
) -> Result<IntegrationOutput> {
    let order = compute_merge_order(priority, query)?;
    let corrector = MnnCorrector::new(params.mnn.clone());
    run_integration_with(
        datasets,
        &order,
        blacklist,
        params,
        &params.variance,
        &corrector,
    )
}

/// Integrate batches in a given order with any variance model and
/// corrector
pub fn run_integration_with<M, C>(
    datasets: &BatchMap<Dataset>,
    order: &MergeOrder,
    blacklist: &Blacklist,
    params: &IntegrationParams,
    model: &M,
    corrector: &C,
) -> Result<IntegrationOutput>
where
    M: VarianceModel + ?Sized,
    C: PairwiseCorrector + ?Sized,
{
    if datasets.is_empty() {
        return Err(IntegrationError::NoDatasets);
    }

    order.validate_against(datasets.keys())?;

    let harmonized = harmonize(datasets)?;
    let logexpr = log_expression(&harmonized, params.pseudocount)?;

    let per_batch = estimate_variance_per_batch(&logexpr, model)?;
    let combined = combine_batches(&per_batch)?;

    let selected = match params.n_top {
        Some(n_top) => select_top_features(
            &combined,
            blacklist,
            params.bio_threshold,
            params.fdr_threshold,
            n_top,
        ),
        None => select_features(
            &combined,
            blacklist,
            params.bio_threshold,
            params.fdr_threshold,
        ),
    };

    if selected.is_empty() {
        warn!("no feature passed the selection thresholds");
    }

    let mut corrected = correct(&logexpr, order, &selected, corrector)?;

    if let Some(n_pcs) = params.n_pcs.filter(|&n| n > 0) {
        corrected = add_corrected_pca(&corrected, n_pcs, params.pca_selected_only, params.mnn.seed)?;
    }

    let corrected = annotate(corrected, &combined, &selected)?;

    Ok(IntegrationOutput {
        corrected,
        combined,
        per_batch,
        selected,
        order: order.clone(),
    })
}

/// Counts are normalized across batches; log-expression passes as is
fn log_expression(datasets: &BatchMap<Dataset>, pseudocount: f32) -> Result<BatchMap<Dataset>> {
    let ncounts = datasets
        .values()
        .filter(|d| d.scale() == ValueScale::Counts)
        .count();

    if ncounts == datasets.len() {
        multi_batch_log_normalize(datasets, pseudocount)
    } else if ncounts == 0 {
        Ok(datasets.clone())
    } else {
        let batch = datasets
            .iter()
            .find(|(_, d)| d.scale() == ValueScale::Counts)
            .map(|(b, _)| b.clone())
            .unwrap_or_default();
        Err(IntegrationError::invalid_dataset(
            &batch,
            "counts mixed with log-expression batches",
        ))
    }
}

fn annotate(
    corrected: CorrectedDataset,
    combined: &VarianceDecomposition,
    selected: &[Box<str>],
) -> Result<CorrectedDataset> {
    let mut dataset = corrected.dataset.clone();

    type Getter = fn(&FeatureVariance) -> f64;
    let columns: [(&str, Getter); 6] = [
        ("mean", |v| v.mean),
        ("total", |v| v.total),
        ("tech", |v| v.tech),
        ("bio", |v| v.bio),
        ("p_value", |v| v.p_value),
        ("fdr", |v| v.fdr),
    ];
    for (key, get) in columns {
        dataset = dataset.with_feature_annotations(
            key,
            combined
                .iter()
                .map(|(f, v)| (f.clone(), AnnotValue::Number(get(v)))),
        )?;
    }

    let chosen: BTreeSet<&str> = selected.iter().map(|x| x.as_ref()).collect();
    let flags: Vec<(Box<str>, AnnotValue)> = dataset
        .features()
        .iter()
        .map(|f| (f.clone(), AnnotValue::Flag(chosen.contains(f.as_ref()))))
        .collect();
    dataset = dataset.with_feature_annotations("selected", flags)?;

    let batches: Vec<(Box<str>, AnnotValue)> = dataset
        .cells()
        .iter()
        .zip(dataset.cell_batches())
        .map(|(c, b)| (c.clone(), AnnotValue::Text(b.clone())))
        .collect();
    dataset = dataset.with_cell_annotations("batch", batches)?;

    let steps: Vec<(Box<str>, AnnotValue)> = dataset
        .cells()
        .iter()
        .zip(corrected.cell_merge_steps())
        .map(|(c, s)| (c.clone(), AnnotValue::Number(s as f64)))
        .collect();
    dataset = dataset.with_cell_annotations("merge_step", steps)?;

    Ok(CorrectedDataset {
        dataset,
        ..corrected
    })
}
