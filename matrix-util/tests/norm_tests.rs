use approx::assert_abs_diff_eq;
use matrix_util::dmatrix_stat::RowStatistics;
use matrix_util::dmatrix_util::*;
use matrix_util::traits::{MatOps, SampleOps};

#[test]
fn cosine_normalization_test() {
    let mut xx = DMatrix::<f32>::runif_seeded(100, 10, 3);
    xx.column_mut(4).fill(0.0);
    xx.cosine_normalize_columns_inplace();

    for j in 0..xx.ncols() {
        let norm = xx.column(j).norm();
        if j == 4 {
            assert_eq!(norm, 0.0);
        } else {
            assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-5);
        }
    }
}

#[test]
fn row_statistics_test() {
    let xx = DMatrix::<f32>::from_row_slice(2, 4, &[1., 2., 3., 4., 0., 0., 0., 5.]);
    let stat = RowStatistics::from_columns(&xx);

    let mu = stat.mean();
    let var = stat.variance();
    assert_abs_diff_eq!(mu[0], 2.5, epsilon = 1e-12);
    assert_abs_diff_eq!(var[0], 5.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(mu[1], 1.25, epsilon = 1e-12);
    assert_abs_diff_eq!(stat.count_positives()[1], 1.0);
}

#[test]
fn concatenate_and_total_variance_test() -> anyhow::Result<()> {
    let aa = DMatrix::<f32>::from_row_slice(1, 2, &[0., 2.]);
    let bb = DMatrix::<f32>::from_row_slice(1, 1, &[4.]);
    let cc = concatenate_columns(&[&aa, &bb])?;
    assert_eq!(cc.shape(), (1, 3));
    assert_eq!(cc[(0, 2)], 4.0);

    // population variance of 0, 2, 4
    assert_abs_diff_eq!(total_row_variance(&cc), 8.0 / 3.0, epsilon = 1e-9);

    let centred = cc.centre_rows();
    assert_abs_diff_eq!(centred.sum(), 0.0, epsilon = 1e-6);

    let dd = DMatrix::<f32>::zeros(2, 1);
    assert!(concatenate_columns(&[&aa, &dd]).is_err());
    Ok(())
}
