use matrix_util::knn_match::*;
use nalgebra::DMatrix;

#[test]
fn mutual_pairs_between_shifted_clusters() -> anyhow::Result<()> {
    // two tight clusters per batch; batch b is a slightly shifted copy of batch a
    let aa = DMatrix::<f32>::from_fn(2, 10, |i, j| {
        let centre = if j < 5 { 0.0 } else { 10.0 };
        if i == 0 { centre + 0.01 * j as f32 } else { 0.0 }
    });
    let bb = aa.map(|x| x + 0.5);

    let search = KnnSearch::Exact;
    let a_to_b = search.search(&aa, &bb, 3)?;
    let b_to_a = search.search(&bb, &aa, 3)?;
    let pairs = mutual_nearest_pairs(&a_to_b, &b_to_a);

    assert!(!pairs.is_empty());
    // never pair across clusters
    for &(a, b) in pairs.iter() {
        assert_eq!(a < 5, b < 5);
    }
    // sorted by the second index
    assert!(pairs.windows(2).all(|w| (w[0].1, w[0].0) < (w[1].1, w[1].0)));
    Ok(())
}

#[test]
fn exact_search_is_repeatable() -> anyhow::Result<()> {
    use matrix_util::traits::SampleOps;
    let aa = DMatrix::<f32>::rnorm_seeded(5, 40, 1);
    let bb = DMatrix::<f32>::rnorm_seeded(5, 30, 2);
    let first = exact_knn_columns(&aa, &bb, 4)?;
    let second = exact_knn_columns(&aa, &bb, 4)?;
    assert_eq!(first, second);
    Ok(())
}
