use crate::common::*;
use crate::correct::MergeStepRecord;
use crate::dataset::{Dataset, ValueScale};
use crate::feature_selection::Blacklist;
use crate::pipeline::IntegrationOutput;
use matrix_util::common_io::*;
use matrix_util::dmatrix_io::{write_named_matrix, MatWithNames};
use matrix_util::mtx_io::{dense_to_triplets, read_mtx_dense, write_mtx_triplets};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

const MTX_FILES: [&str; 2] = ["matrix.mtx.gz", "matrix.mtx"];
const FEATURE_FILES: [&str; 4] = [
    "features.tsv.gz",
    "features.tsv",
    "genes.tsv.gz",
    "genes.tsv",
];
const BARCODE_FILES: [&str; 2] = ["barcodes.tsv.gz", "barcodes.tsv"];

/// Split `batch=path`
pub fn parse_batch_arg(arg: &str) -> anyhow::Result<(Box<str>, Box<str>)> {
    match arg.split_once('=') {
        Some((batch, path)) if !batch.is_empty() && !path.is_empty() => {
            Ok((batch.into(), path.into()))
        }
        _ => anyhow::bail!("expected `batch=path`, got '{}'", arg),
    }
}

/// Options for reading batches from disk
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOptions {
    /// append `@batch` to every cell id
    pub tag_cells: bool,
    /// the values are log-expression, not counts
    pub log_input: bool,
}

/// Read a batch from a 10x-style directory (`matrix.mtx`,
/// `features.tsv` or `genes.tsv`, `barcodes.tsv`, optionally gzipped)
/// or from a delimited table with feature ids in the first column and
/// a header line of cell ids
pub fn read_batch(batch: &str, path: &str, opts: &ReadOptions) -> anyhow::Result<Dataset> {
    let MatWithNames { rows, cols, mat } = if Path::new(path).is_dir() {
        read_10x_dir(path)?
    } else {
        let delim = if path.ends_with(".csv") || path.ends_with(".csv.gz") {
            ','
        } else {
            '\t'
        };
        MatWithNames::read_named(path, Some(delim))?
    };

    let cells: Vec<Box<str>> = if opts.tag_cells {
        cols.iter()
            .map(|c| format!("{}@{}", c, batch).into_boxed_str())
            .collect()
    } else {
        cols
    };

    let scale = if opts.log_input {
        ValueScale::LogExpression
    } else {
        ValueScale::Counts
    };

    info!(
        "{}: read {} features x {} cells from {}",
        batch,
        rows.len(),
        cells.len(),
        path
    );

    Ok(Dataset::new(batch, rows, cells, mat, scale)?)
}

/// Read every `batch=path` argument
pub fn read_batches(args: &[Box<str>], opts: &ReadOptions) -> anyhow::Result<BatchMap<Dataset>> {
    let mut ret = BatchMap::new();
    for arg in args {
        let (batch, path) = parse_batch_arg(arg)?;
        let data = read_batch(&batch, &path, opts)?;
        if ret.insert(batch.clone(), data).is_some() {
            anyhow::bail!("batch '{}' given more than once", batch);
        }
    }
    Ok(ret)
}

fn read_10x_dir(dir: &str) -> anyhow::Result<MatWithNames> {
    let mtx_file = find_file_in_dir(dir, &MTX_FILES)?;
    let feature_file = find_file_in_dir(dir, &FEATURE_FILES)?;
    let barcode_file = find_file_in_dir(dir, &BARCODE_FILES)?;

    let mat = read_mtx_dense(&mtx_file)?;
    let rows = read_first_words(&feature_file)?;
    let cols = read_first_words(&barcode_file)?;

    if rows.len() != mat.nrows() || cols.len() != mat.ncols() {
        anyhow::bail!(
            "{}: {} features and {} barcodes for a {} x {} matrix",
            dir,
            rows.len(),
            cols.len(),
            mat.nrows(),
            mat.ncols()
        );
    }
    Ok(MatWithNames { rows, cols, mat })
}

fn read_first_words(file: &str) -> anyhow::Result<Vec<Box<str>>> {
    Ok(read_lines_of_words(file, Some('\t'), false)?
        .lines
        .into_iter()
        .filter_map(|words| words.into_iter().next())
        .collect())
}

/// Write counts of a dataset as a 10x-style directory
pub fn write_10x_dir(data: &Dataset, dir: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = |name: &str| -> anyhow::Result<String> {
        Path::new(dir)
            .join(name)
            .to_str()
            .map(|x| x.to_string())
            .ok_or_else(|| anyhow::anyhow!("invalid path under {}", dir))
    };

    let triplets = dense_to_triplets(data.values());
    write_mtx_triplets(
        &triplets,
        data.num_features(),
        data.num_cells(),
        &path(MTX_FILES[0])?,
    )?;
    write_lines(data.features(), &path(FEATURE_FILES[0])?)?;
    write_lines(data.cells(), &path(BARCODE_FILES[0])?)?;
    Ok(())
}

/// Feature ids from the first word of each line, plus prefixes
pub fn read_blacklist(file: Option<&str>, prefixes: &[Box<str>]) -> anyhow::Result<Blacklist> {
    let mut ret = match file {
        Some(file) => Blacklist::from_ids(read_first_words(file)?),
        None => Blacklist::new(),
    };
    for p in prefixes {
        ret = ret.with_prefix(p);
    }
    if !ret.is_empty() {
        info!(
            "blacklist: {} ids and prefixes {:?}",
            ret.num_ids(),
            prefixes
        );
    }
    Ok(ret)
}

#[derive(Serialize)]
struct Summary<'a> {
    merge_order: &'a [Box<str>],
    n_features: usize,
    n_selected: usize,
    n_cells: usize,
    cells_per_batch: BatchMap<usize>,
    steps: &'a [MergeStepRecord],
    reduced: Vec<&'a str>,
}

/// Output file names under a prefix
pub struct OutputFiles {
    pub corrected: String,
    pub cells: String,
    pub variance: String,
    pub selected: String,
    pub lost_variance: String,
    pub merge_order: String,
    pub pca: String,
    pub summary: String,
}

impl OutputFiles {
    pub fn new(prefix: &str) -> Self {
        Self {
            corrected: format!("{}.corrected.tsv.gz", prefix),
            cells: format!("{}.cells.tsv", prefix),
            variance: format!("{}.variance.tsv", prefix),
            selected: format!("{}.selected.txt", prefix),
            lost_variance: format!("{}.lost_variance.tsv", prefix),
            merge_order: format!("{}.merge_order.txt", prefix),
            pca: format!("{}.pca.tsv.gz", prefix),
            summary: format!("{}.summary.json", prefix),
        }
    }
}

/// Write everything an integration run produced under `prefix`
pub fn write_integration_output(out: &IntegrationOutput, prefix: &str) -> anyhow::Result<()> {
    let files = OutputFiles::new(prefix);
    mkdir(&files.summary)?;

    let data = &out.corrected.dataset;
    let corrected = out
        .corrected
        .corrected()
        .ok_or_else(|| anyhow::anyhow!("no corrected values"))?;

    write_named_matrix(
        corrected,
        data.features(),
        data.cells(),
        "feature",
        &files.corrected,
        "\t",
    )?;

    let steps = out.corrected.cell_merge_steps();
    let mut cell_lines: Vec<Box<str>> = vec!["cell\tbatch\tmerge_step".into()];
    cell_lines.extend(
        data.cells()
            .iter()
            .zip(data.cell_batches())
            .zip(steps.iter())
            .map(|((c, b), s)| format!("{}\t{}\t{}", c, b, s).into_boxed_str()),
    );
    write_lines(&cell_lines, &files.cells)?;

    write_lines(&out.combined.to_lines(), &files.variance)?;
    write_lines(&out.selected, &files.selected)?;
    write_lines(&out.corrected.lost_variance_lines(), &files.lost_variance)?;
    write_lines(out.order.batches(), &files.merge_order)?;

    if let Some(pca) = data.reduced(PCA) {
        let pcs: Vec<Box<str>> = (1..=pca.nrows())
            .map(|k| format!("PC{}", k).into_boxed_str())
            .collect();
        write_named_matrix(pca, &pcs, data.cells(), "pc", &files.pca, "\t")?;
    }

    let cells_per_batch = out
        .corrected
        .batch_ranges
        .iter()
        .map(|(b, r)| (b.clone(), r.len()))
        .collect();

    let summary = Summary {
        merge_order: out.order.batches(),
        n_features: data.num_features(),
        n_selected: out.selected.len(),
        n_cells: data.num_cells(),
        cells_per_batch,
        steps: &out.corrected.steps,
        reduced: data.reduced_names(),
    };
    let mut buf = open_buf_writer(&files.summary)?;
    serde_json::to_writer_pretty(&mut buf, &summary)?;
    writeln!(buf)?;
    buf.flush()?;

    info!("wrote results under {}", prefix);
    Ok(())
}
