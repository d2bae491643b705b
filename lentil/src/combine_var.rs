use crate::common::*;
use crate::variance::{chisq_upper_tail, fill_fdr, FeatureVariance, VarianceDecomposition};

/// Pool per-batch variance decompositions into one
///
/// * `decompositions` - one per batch, all over the same feature sequence
/// * `cell_counts` - number of cells of each batch, same order
///
/// `mean`, `total` and `tech` are averaged with weights proportional
/// to the number of cells, so larger batches count for more. The
/// p-values are recomputed with the pooled residual degrees of freedom
/// `sum(n_b - 1)` and adjusted again for FDR. Rows stay in the input
/// feature order.
pub fn combine(
    decompositions: &[&VarianceDecomposition],
    cell_counts: &[usize],
) -> Result<VarianceDecomposition> {
    let first = match decompositions.first() {
        Some(x) => *x,
        None => return Err(IntegrationError::NoDatasets),
    };

    if decompositions.len() != cell_counts.len() {
        return Err(IntegrationError::Numerical(format!(
            "{} decompositions but {} cell counts",
            decompositions.len(),
            cell_counts.len()
        )));
    }

    for (b, decomp) in decompositions.iter().enumerate().skip(1) {
        if decomp.features() != first.features() {
            return Err(IntegrationError::FeatureMismatch {
                batch: format!("decomposition #{}", b).into(),
                reference: "decomposition #0".into(),
            });
        }
    }

    let ntot: usize = cell_counts.iter().sum();
    if ntot == 0 {
        return Err(IntegrationError::Numerical(
            "no cells to weight the batches by".into(),
        ));
    }

    let weights: Vec<f64> = cell_counts
        .iter()
        .map(|&n| n as f64 / ntot as f64)
        .collect();

    let df = cell_counts
        .iter()
        .map(|&n| n.saturating_sub(1))
        .sum::<usize>()
        .max(1) as f64;

    let mut stats = (0..first.len())
        .map(|i| {
            let (mut mean, mut total, mut tech) = (0.0, 0.0, 0.0);
            for (decomp, w) in decompositions.iter().zip(weights.iter()) {
                let v = &decomp.stats()[i];
                mean += w * v.mean;
                total += w * v.total;
                tech += w * v.tech;
            }
            Ok(FeatureVariance {
                mean,
                total,
                tech,
                bio: total - tech,
                p_value: chisq_upper_tail(df, total, tech)?,
                fdr: f64::NAN,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    fill_fdr(&mut stats);

    debug!(
        "combined {} decompositions over {} cells ({} d.f.)",
        decompositions.len(),
        ntot,
        df
    );

    VarianceDecomposition::new(first.features().to_vec(), stats, ntot)
}

/// Combine decompositions keyed by batch, in batch order
pub fn combine_batches(
    decompositions: &BatchMap<VarianceDecomposition>,
) -> Result<VarianceDecomposition> {
    let decomps: Vec<&VarianceDecomposition> = decompositions.values().collect();
    let counts: Vec<usize> = decomps.iter().map(|x| x.num_cells()).collect();
    combine(&decomps, &counts)
}
