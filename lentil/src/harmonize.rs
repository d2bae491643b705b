use crate::common::*;
use crate::dataset::Dataset;
use rayon::prelude::*;

/// Features shared by every dataset, in lexicographic order
///
/// The order depends only on the set of shared features, so the same
/// datasets give the same answer however the input map was built.
pub fn shared_features(datasets: &BatchMap<Dataset>) -> Result<Vec<Box<str>>> {
    if datasets.is_empty() {
        return Err(IntegrationError::NoDatasets);
    }

    let mut shared: Option<BTreeSet<&str>> = None;
    for (batch, data) in datasets.iter() {
        if data.num_features() == 0 {
            return Err(IntegrationError::invalid_dataset(batch, "no features"));
        }
        let these: BTreeSet<&str> = data.features().iter().map(|x| x.as_ref()).collect();
        shared = Some(match shared {
            Some(prev) => prev.intersection(&these).copied().collect(),
            None => these,
        });
    }

    let mut ret: Vec<Box<str>> = shared
        .unwrap_or_default()
        .into_iter()
        .map(Box::from)
        .collect();

    if ret.is_empty() {
        return Err(IntegrationError::EmptyIntersection {
            batches: datasets.keys().cloned().collect(),
        });
    }

    ret.par_sort();
    Ok(ret)
}

/// Restrict every dataset to the features shared by all, rows in the
/// same lexicographic order. Feature annotations of dropped features
/// are dropped too. The inputs are left as they are.
pub fn harmonize(datasets: &BatchMap<Dataset>) -> Result<BatchMap<Dataset>> {
    let features = shared_features(datasets)?;

    for (batch, data) in datasets.iter() {
        let dropped = data.num_features() - features.len();
        if dropped > 0 {
            debug!("{}: dropping {} unshared features", batch, dropped);
        }
    }

    let ret = datasets
        .iter()
        .map(|(batch, data)| Ok((batch.clone(), data.subset_features(&features)?)))
        .collect::<Result<BatchMap<Dataset>>>()?;

    info!(
        "harmonized {} batches on {} shared features",
        ret.len(),
        features.len()
    );
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ValueScale;

    fn dataset(batch: &str, features: &[&str]) -> Dataset {
        let nf = features.len();
        let values = Mat::from_fn(nf, 2, |i, j| (i * 10 + j) as f32);
        Dataset::new(
            batch,
            features.iter().map(|&x| x.into()).collect(),
            vec![format!("{}_c0", batch).into(), format!("{}_c1", batch).into()],
            values,
            ValueScale::Counts,
        )
        .unwrap()
    }

    #[test]
    fn keeps_the_intersection_in_sorted_order() -> anyhow::Result<()> {
        let mut datasets = BatchMap::new();
        datasets.insert("b1".into(), dataset("b1", &["g3", "g1", "g2", "g9"]));
        datasets.insert("b2".into(), dataset("b2", &["g2", "g7", "g3", "g1"]));

        let out = harmonize(&datasets)?;
        let expected: Vec<Box<str>> = vec!["g1".into(), "g2".into(), "g3".into()];
        for data in out.values() {
            assert_eq!(data.features(), expected.as_slice());
        }

        // row "g1" of b2 was its last row
        assert_eq!(out["b2"].values()[(0, 1)], 31.0);

        // inputs untouched
        assert_eq!(datasets["b1"].num_features(), 4);
        Ok(())
    }

    #[test]
    fn nothing_shared_is_an_error() {
        let mut datasets = BatchMap::new();
        datasets.insert("b1".into(), dataset("b1", &["a"]));
        datasets.insert("b2".into(), dataset("b2", &["b"]));
        match harmonize(&datasets) {
            Err(IntegrationError::EmptyIntersection { batches }) => {
                assert_eq!(batches.len(), 2);
            }
            other => panic!("unexpected {:?}", other.map(|x| x.len())),
        }
    }

    #[test]
    fn no_input_is_an_error() {
        assert!(matches!(
            harmonize(&BatchMap::new()),
            Err(IntegrationError::NoDatasets)
        ));
    }
}
