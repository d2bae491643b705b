use matrix_util::dmatrix_io::*;
use matrix_util::mtx_io::*;
use matrix_util::traits::{IoOps, SampleOps};
use nalgebra::DMatrix;

#[test]
fn dmatrix_io_test() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let xx = DMatrix::<f32>::runif_seeded(50, 20, 1);

    let tsv_file = dir.path().join("xx.txt.gz");
    let tsv_file = tsv_file.to_str().unwrap();
    xx.to_tsv(tsv_file)?;

    let yy = DMatrix::<f32>::read_file_delim(tsv_file, '\t', None)?;

    approx::assert_abs_diff_eq!(xx, yy);

    Ok(())
}

#[test]
fn named_matrix_io_test() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("named.tsv");
    let file = file.to_str().unwrap();

    let out = MatWithNames {
        rows: vec!["g1".into(), "g2".into(), "g3".into()],
        cols: vec!["c1".into(), "c2".into()],
        mat: DMatrix::<f32>::from_row_slice(3, 2, &[1., 2., 3., 4., 5., 6.]),
    };
    out.write_named(file, "gene", "\t")?;

    let back = MatWithNames::read_named(file, Some('\t'))?;
    assert_eq!(back.rows, out.rows);
    assert_eq!(back.cols, out.cols);
    assert_eq!(back.mat, out.mat);
    Ok(())
}

#[test]
fn mtx_io_test() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("sub").join("matrix.mtx.gz");
    let file = file.to_str().unwrap();

    let xx = DMatrix::<f32>::from_row_slice(3, 4, &[0., 1., 0., 2., 3., 0., 0., 0., 0., 0., 7., 1.]);
    let triplets = dense_to_triplets(&xx);
    assert_eq!(triplets.len(), 5);

    write_mtx_triplets(&triplets, 3, 4, file)?;
    let yy = read_mtx_dense(file)?;
    assert_eq!(xx, yy);
    Ok(())
}
