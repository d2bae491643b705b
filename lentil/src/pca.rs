use crate::common::*;
use crate::correct::CorrectedDataset;
use matrix_util::dmatrix_rsvd::RSVD;
use matrix_util::traits::MatOps;

/// Principal component scores of the corrected values, `n_pcs x cells`
///
/// Each feature is centred across cells before a randomized SVD with
/// a fixed seed. When `selected_only` is set, only the features used
/// for finding neighbours enter the decomposition.
pub fn corrected_pca(
    corrected: &CorrectedDataset,
    n_pcs: usize,
    selected_only: bool,
    seed: u64,
) -> Result<Mat> {
    let values = corrected.corrected().ok_or_else(|| {
        IntegrationError::invalid_dataset(corrected.dataset.name(), "no corrected values")
    })?;

    let mut xx = if selected_only {
        let rows = corrected.dataset.feature_positions(&corrected.selected)?;
        values.subset_rows(&rows)
    } else {
        values.clone()
    };

    let max_rank = xx.nrows().min(xx.ncols());
    if n_pcs == 0 || max_rank == 0 {
        return Err(IntegrationError::Numerical(format!(
            "cannot take {} components of a {} x {} matrix",
            n_pcs,
            xx.nrows(),
            xx.ncols()
        )));
    }
    let rank = n_pcs.min(max_rank);
    if rank < n_pcs {
        warn!("only {} components are available, asked for {}", rank, n_pcs);
    }

    xx.centre_rows_inplace();

    let (_, dd, vv) = xx
        .rsvd_seeded(rank, seed)
        .map_err(|e| IntegrationError::Numerical(e.to_string()))?;

    // scores: D * V^T
    let mut scores = vv.transpose();
    for (mut row, &d) in scores.row_iter_mut().zip(dd.iter()) {
        row *= d;
    }
    Ok(scores)
}

/// Attach [`corrected_pca`] to the dataset under `"pca"`
pub fn add_corrected_pca(
    corrected: &CorrectedDataset,
    n_pcs: usize,
    selected_only: bool,
    seed: u64,
) -> Result<CorrectedDataset> {
    let scores = corrected_pca(corrected, n_pcs, selected_only, seed)?;
    info!("{} principal components of {} cells", scores.nrows(), scores.ncols());
    Ok(CorrectedDataset {
        dataset: corrected.dataset.with_reduced(PCA, scores)?,
        ..corrected.clone()
    })
}
