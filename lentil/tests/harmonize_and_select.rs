mod common;

use common::*;
use lentil::combine_var::combine;
use lentil::common::*;
use lentil::dataset::{AnnotValue, Dataset, ValueScale};
use lentil::feature_selection::Blacklist;
use lentil::harmonize::harmonize;
use lentil::merge_order::MergeOrder;
use lentil::pipeline::{run_integration_with, IntegrationParams};
use lentil::variance::{FeatureVariance, VarianceDecomposition};

fn named(batch: &str, features: &[&str], ncells: usize) -> Dataset {
    let features: Vec<Box<str>> = features.iter().map(|&x| x.into()).collect();
    log_batch(batch, features, ncells, 11)
}

#[test]
fn harmonized_features_do_not_depend_on_input_order() -> anyhow::Result<()> {
    let a = named("a", &["z", "m", "b", "q", "x"], 4);
    let b = named("b", &["q", "b", "z", "y"], 5);
    let c = named("c", &["b", "z", "q", "m"], 3);

    let mut one = BatchMap::new();
    one.insert("a".into(), a.clone());
    one.insert("b".into(), b.clone());
    one.insert("c".into(), c.clone());

    let mut two = BatchMap::new();
    two.insert("c".into(), c);
    two.insert("a".into(), a);
    two.insert("b".into(), b);

    let h1 = harmonize(&one)?;
    let h2 = harmonize(&two)?;

    let expected: Vec<Box<str>> = vec!["b".into(), "q".into(), "z".into()];
    for (x, y) in h1.values().zip(h2.values()) {
        assert_eq!(x.features(), expected.as_slice());
        assert_eq!(x.features(), y.features());
        assert_eq!(x.values(), y.values());
    }
    Ok(())
}

#[test]
fn the_larger_batch_pulls_the_combined_mean() -> anyhow::Result<()> {
    let features: Vec<Box<str>> = vec!["g".into()];
    let row = |mean: f64| FeatureVariance {
        mean,
        total: 1.5,
        tech: 1.0,
        bio: 0.5,
        p_value: 0.1,
        fdr: 0.1,
    };
    let small = VarianceDecomposition::new(features.clone(), vec![row(0.0)], 10)?;
    let large = VarianceDecomposition::new(features, vec![row(10.0)], 90)?;

    let out = combine(&[&small, &large], &[10, 90])?;
    let mean = out.stats()[0].mean;
    assert!((mean - 10.0).abs() < (mean - 0.0).abs());
    Ok(())
}

#[test]
fn blacklisted_features_are_never_used() -> anyhow::Result<()> {
    let features = feature_names(30);
    let datasets = batch_map(vec![
        log_batch("x", features.clone(), 20, 5),
        log_batch("y", features.clone(), 25, 6),
    ]);

    let mut model = FakeVarianceModel::flat();
    model.bio.insert("f0003".into(), 100.0);
    model.bio.insert("f0004".into(), 90.0);

    let blacklist = Blacklist::from_ids(["f0003"]);
    let corrector = FakeCorrector::new(0.0);
    let params = IntegrationParams {
        n_top: Some(5),
        ..Default::default()
    };

    let out = run_integration_with(
        &datasets,
        &MergeOrder::new(["x", "y"]),
        &blacklist,
        &params,
        &model,
        &corrector,
    )?;

    assert!(!out.selected.iter().any(|f| f.as_ref() == "f0003"));
    assert_eq!(out.selected[0].as_ref(), "f0004");
    assert_eq!(out.selected.len(), 5);
    assert_eq!(corrector.seen()[0].n_selected, 5);

    let meta = &out.corrected.dataset.feature_metadata()["f0003"];
    assert_eq!(meta["selected"], AnnotValue::Flag(false));
    Ok(())
}

#[test]
fn nothing_selected_fails_fast() {
    let features = feature_names(10);
    let datasets = batch_map(vec![
        log_batch("x", features.clone(), 10, 1),
        log_batch("y", features, 10, 2),
    ]);
    let params = IntegrationParams {
        bio_threshold: 1e6,
        ..Default::default()
    };
    let corrector = FakeCorrector::new(0.0);
    let ret = run_integration_with(
        &datasets,
        &MergeOrder::new(["x", "y"]),
        &Blacklist::new(),
        &params,
        &FakeVarianceModel::flat(),
        &corrector,
    );
    assert!(matches!(ret, Err(IntegrationError::EmptyFeatureSet)));
    assert!(corrector.seen().is_empty());
}

#[test]
fn counts_and_log_values_do_not_mix() {
    let features = feature_names(4);
    let counts = Dataset::new(
        "x",
        features.clone(),
        vec!["c0".into(), "c1".into()],
        Mat::from_element(4, 2, 1.0),
        ValueScale::Counts,
    )
    .unwrap();
    let datasets = batch_map(vec![counts, log_batch("y", features, 3, 1)]);
    let ret = run_integration_with(
        &datasets,
        &MergeOrder::new(["x", "y"]),
        &Blacklist::new(),
        &IntegrationParams::default(),
        &FakeVarianceModel::flat(),
        &FakeCorrector::new(0.0),
    );
    assert!(matches!(ret, Err(IntegrationError::InvalidDataset { .. })));
}
