mod common;

use common::*;
use lentil::common::*;
use lentil::correct::correct;
use lentil::dataset::Dataset;
use lentil::feature_selection::Blacklist;
use lentil::merge_order::{compute_merge_order, BatchPriority, MergeOrder};
use lentil::pipeline::{run_integration_with, IntegrationParams};

fn three_batches() -> BatchMap<Dataset> {
    let features = feature_names(200);
    batch_map(vec![
        log_batch("A", features.clone(), 50, 1),
        log_batch("B", features.clone(), 80, 2),
        log_batch("C", features, 30, 3),
    ])
}

#[test]
fn cells_accumulate_in_merge_order() -> anyhow::Result<()> {
    let datasets = three_batches();

    let mut priority = BatchMap::new();
    priority.insert("A".into(), BatchPriority { rank: 1, size: 50 });
    priority.insert("B".into(), BatchPriority { rank: 1, size: 80 });
    priority.insert("C".into(), BatchPriority { rank: 2, size: 30 });
    let order = compute_merge_order(&priority, None)?;
    assert_eq!(order, MergeOrder::new(["B", "A", "C"]));

    let corrector = FakeCorrector::new(0.5);
    let out = run_integration_with(
        &datasets,
        &order,
        &Blacklist::new(),
        &IntegrationParams::default(),
        &FakeVarianceModel::flat(),
        &corrector,
    )?;

    let seen = corrector.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!((seen[0].step, seen[0].batch.as_str()), (1, "A"));
    assert_eq!((seen[0].n_reference, seen[0].n_target), (80, 50));
    assert_eq!((seen[1].step, seen[1].batch.as_str()), (2, "C"));
    assert_eq!((seen[1].n_reference, seen[1].n_target), (130, 30));

    let corrected = out.corrected.corrected().unwrap();
    assert_eq!(corrected.shape(), (200, 160));

    let lost = out.corrected.lost_variance();
    assert_eq!(lost.len(), 2);
    assert_eq!((lost[0].0, lost[0].1), (1, "A"));
    assert_eq!((lost[1].0, lost[1].1), (2, "C"));
    assert!(lost.iter().all(|x| x.2.is_finite()));

    // cell metadata follows the merge order
    let data = &out.corrected.dataset;
    assert_eq!(data.cells()[0].as_ref(), "B_0");
    assert_eq!(data.cells()[80].as_ref(), "A_0");
    assert_eq!(data.cells()[130].as_ref(), "C_0");
    assert_eq!(out.corrected.cell_merge_steps()[159], 2);
    Ok(())
}

#[test]
fn the_first_batch_is_left_alone() -> anyhow::Result<()> {
    let datasets = three_batches();
    let order = MergeOrder::new(["C", "B", "A"]);
    let selected = feature_names(10);

    let out = correct(&datasets, &order, &selected, &FakeCorrector::new(1.0))?;

    let first = out.corrected_batch("C").unwrap();
    assert_eq!(&first, datasets["C"].values());

    let second = out.corrected_batch("B").unwrap();
    assert_eq!(second, datasets["B"].values().map(|x| x + 1.0));
    Ok(())
}

#[test]
fn a_bad_order_stops_before_any_step() {
    let datasets = three_batches();
    let corrector = FakeCorrector::new(0.0);

    for order in [
        MergeOrder::new(["A", "B"]),
        MergeOrder::new(["A", "B", "C", "A"]),
        MergeOrder::new(["A", "B", "C", "D"]),
    ] {
        let ret = correct(&datasets, &order, &feature_names(5), &corrector);
        assert!(matches!(ret, Err(IntegrationError::OrderMismatch { .. })));
    }
    assert!(corrector.seen().is_empty());
}

#[test]
fn no_selected_feature_stops_before_any_step() {
    let datasets = three_batches();
    let corrector = FakeCorrector::new(0.0);
    let ret = correct(&datasets, &MergeOrder::new(["A", "B", "C"]), &[], &corrector);
    assert!(matches!(ret, Err(IntegrationError::EmptyFeatureSet)));
    assert!(corrector.seen().is_empty());

    let ret = correct(
        &datasets,
        &MergeOrder::new(["A", "B", "C"]),
        &["not_there".into()],
        &corrector,
    );
    assert!(matches!(ret, Err(IntegrationError::UnknownFeature { .. })));
    assert!(corrector.seen().is_empty());
}

#[test]
fn no_pairs_names_the_step_and_batch() {
    let datasets = three_batches();
    let ret = correct(
        &datasets,
        &MergeOrder::new(["B", "A", "C"]),
        &feature_names(5),
        &FakeCorrector::without_pairs(),
    );
    match ret {
        Err(IntegrationError::InsufficientNeighbours { step, batch }) => {
            assert_eq!(step, 1);
            assert_eq!(batch.as_ref(), "A");
        }
        other => panic!("unexpected {:?}", other.map(|x| x.steps)),
    }
}

#[test]
fn inputs_are_not_changed() -> anyhow::Result<()> {
    let datasets = three_batches();
    let before: Vec<Mat> = datasets.values().map(|d| d.values().clone()).collect();

    correct(
        &datasets,
        &MergeOrder::new(["A", "B", "C"]),
        &feature_names(20),
        &FakeCorrector::new(3.0),
    )?;

    let after: Vec<Mat> = datasets.values().map(|d| d.values().clone()).collect();
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn the_same_inputs_give_the_same_result() -> anyhow::Result<()> {
    let datasets = three_batches();
    let order = MergeOrder::new(["B", "A", "C"]);
    let one = correct(&datasets, &order, &feature_names(20), &FakeCorrector::new(0.1))?;
    let two = correct(&datasets, &order, &feature_names(20), &FakeCorrector::new(0.1))?;
    assert_eq!(one.corrected(), two.corrected());
    assert_eq!(one.steps, two.steps);
    Ok(())
}
