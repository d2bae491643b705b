use crate::common::*;
use crate::dataset::{AnnotValue, Dataset, ValueScale};

pub const SIZE_FACTOR: &str = "size_factor";

/// Log-normalize counts of several batches on a common scale
///
/// Within a batch, size factors are library sizes centred at mean 1.
/// They are then multiplied by `mean_b / min(mean)` so that every
/// batch looks like it was sequenced as shallow as the lowest-coverage
/// batch, and values become `log2(x / sf + pseudocount)`.
///
/// Size factors, including the between-batch adjustment, are kept as
/// the `size_factor` cell annotation.
pub fn multi_batch_log_normalize(
    datasets: &BatchMap<Dataset>,
    pseudocount: f32,
) -> Result<BatchMap<Dataset>> {
    if datasets.is_empty() {
        return Err(IntegrationError::NoDatasets);
    }

    if !(pseudocount > 0.0 && pseudocount.is_finite()) {
        return Err(IntegrationError::Numerical(format!(
            "pseudocount must be positive, got {}",
            pseudocount
        )));
    }

    let mut libsizes = BatchMap::new();
    for (batch, data) in datasets.iter() {
        if data.scale() != ValueScale::Counts {
            return Err(IntegrationError::invalid_dataset(
                batch,
                "already log-transformed",
            ));
        }
        if data.num_cells() == 0 {
            return Err(IntegrationError::invalid_dataset(batch, "no cells"));
        }
        let lib: Vec<f64> = data
            .values()
            .column_iter()
            .map(|x| x.iter().map(|&v| v as f64).sum::<f64>())
            .collect();
        if let Some(j) = lib.iter().position(|&x| x <= 0.0) {
            return Err(IntegrationError::invalid_dataset(
                batch,
                format!("cell '{}' has no counts", data.cells()[j]),
            ));
        }
        libsizes.insert(batch.clone(), lib);
    }

    let min_mean = libsizes
        .values()
        .map(|lib| batch_mean(lib))
        .fold(f64::INFINITY, f64::min);

    let mut ret = BatchMap::new();
    for (batch, data) in datasets.iter() {
        let lib = &libsizes[batch];
        let mean = batch_mean(lib);
        debug!(
            "{}: mean library size {:.1}, scaled by {:.3}",
            batch,
            mean,
            min_mean / mean
        );

        // count / size_factor has library size `min_mean` in every cell
        let size_factors: Vec<f64> = lib.iter().map(|&l| l / min_mean).collect();

        let mut values = data.values().clone();
        for (mut xx_j, &sf) in values.column_iter_mut().zip(size_factors.iter()) {
            xx_j.apply(|x| *x = (((*x as f64) / sf) as f32 + pseudocount).log2());
        }

        let normalized = data
            .with_values(values, ValueScale::LogExpression)?
            .with_cell_annotations(
                SIZE_FACTOR,
                data.cells()
                    .iter()
                    .cloned()
                    .zip(size_factors.iter().map(|&sf| AnnotValue::Number(sf))),
            )?;

        ret.insert(batch.clone(), normalized);
    }

    info!(
        "log-normalized {} batches to a library size of {:.1}",
        ret.len(),
        min_mean
    );
    Ok(ret)
}

fn batch_mean(lib: &[f64]) -> f64 {
    lib.iter().sum::<f64>() / lib.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn dataset(batch: &str, values: Mat) -> Dataset {
        let features = (0..values.nrows()).map(|i| format!("g{}", i).into()).collect();
        let cells = (0..values.ncols())
            .map(|j| format!("{}_{}", batch, j).into())
            .collect();
        Dataset::new(batch, features, cells, values, ValueScale::Counts).unwrap()
    }

    #[test]
    fn deeper_batches_are_scaled_down() -> anyhow::Result<()> {
        let mut datasets = BatchMap::new();
        datasets.insert("shallow".into(), dataset("shallow", Mat::from_element(2, 3, 1.0)));
        datasets.insert("deep".into(), dataset("deep", Mat::from_element(2, 3, 4.0)));

        let out = multi_batch_log_normalize(&datasets, 1.0)?;
        for data in out.values() {
            assert_eq!(data.scale(), ValueScale::LogExpression);
            for &x in data.values().iter() {
                assert_abs_diff_eq!(x, 1.0, epsilon = 1e-6);
            }
        }

        match &out["deep"].cell_metadata()["deep_0"][SIZE_FACTOR] {
            AnnotValue::Number(sf) => assert_abs_diff_eq!(*sf, 4.0, epsilon = 1e-9),
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn empty_cells_and_log_inputs_are_rejected() -> anyhow::Result<()> {
        let mut values = Mat::from_element(2, 2, 1.0);
        values.column_mut(1).fill(0.0);
        let mut datasets = BatchMap::new();
        datasets.insert("b".into(), dataset("b", values));
        assert!(multi_batch_log_normalize(&datasets, 1.0).is_err());

        let mut datasets = BatchMap::new();
        let data = dataset("b", Mat::from_element(2, 2, 1.0));
        let logged = data.with_values(data.values().clone(), ValueScale::LogExpression)?;
        datasets.insert("b".into(), logged);
        assert!(multi_batch_log_normalize(&datasets, 1.0).is_err());
        Ok(())
    }
}
