use crate::common_io::*;
use nalgebra::DMatrix;
use std::io::Write;

/// Write the triplets into a MatrixMarket file with 1-based indices
/// * `triplets` - `(row, col, val)` with 0-based indices
/// * `nrow` - number of rows
/// * `ncol` - number of columns
/// * `mtx_file` - the output file (e.g., "matrix.mtx.gz")
pub fn write_mtx_triplets(
    triplets: &[(u64, u64, f32)],
    nrow: usize,
    ncol: usize,
    mtx_file: &str,
) -> anyhow::Result<()> {
    mkdir(mtx_file)?;

    let mut buf = open_buf_writer(mtx_file)?;

    writeln!(buf, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(buf, "{}\t{}\t{}", nrow, ncol, triplets.len())?;

    for (row, col, val) in triplets {
        writeln!(buf, "{}\t{}\t{}", row + 1, col + 1, val)?;
    }

    buf.flush()?;
    Ok(())
}

/// Read a matrix market file and return a vector of triplets (row,
/// col, val) with 0-based indices, sorted by column then row, and
/// the `(nrow, ncol, nnz)` header
/// * `mtx_file` - Path to the matrix market file
pub fn read_mtx_triplets(
    mtx_file: &str,
) -> anyhow::Result<(Vec<(u64, u64, f32)>, (usize, usize, usize))> {
    let ReadLinesOut { lines, header } = read_lines_of_words(mtx_file, None, true)?;

    if header.len() != 3 {
        anyhow::bail!("failed to parse mtx header in {}", mtx_file);
    }

    let nrow = header[0].parse::<usize>()?;
    let ncol = header[1].parse::<usize>()?;
    let nnz = header[2].parse::<usize>()?;

    let mut triplets = Vec::with_capacity(nnz);
    for (k, words) in lines.iter().enumerate() {
        if words.len() != 3 {
            anyhow::bail!("{}: entry {} does not have 3 fields", mtx_file, k + 1);
        }
        let row = words[0].parse::<u64>()?;
        let col = words[1].parse::<u64>()?;
        let val = words[2].parse::<f32>()?;
        if row == 0 || col == 0 || row as usize > nrow || col as usize > ncol {
            anyhow::bail!(
                "{}: entry ({}, {}) outside of [{} x {}]",
                mtx_file,
                row,
                col,
                nrow,
                ncol
            );
        }
        triplets.push((row - 1, col - 1, val));
    }

    if triplets.len() != nnz {
        log::warn!(
            "{}: header says {} entries, found {}",
            mtx_file,
            nnz,
            triplets.len()
        );
    }

    triplets.sort_by_key(|&(row, col, _)| (col, row));
    Ok((triplets, (nrow, ncol, nnz)))
}

/// Read a matrix market file into a dense matrix; duplicated entries
/// are summed
pub fn read_mtx_dense(mtx_file: &str) -> anyhow::Result<DMatrix<f32>> {
    let (triplets, (nrow, ncol, _)) = read_mtx_triplets(mtx_file)?;
    let mut ret = DMatrix::<f32>::zeros(nrow, ncol);
    for (row, col, val) in triplets {
        ret[(row as usize, col as usize)] += val;
    }
    Ok(ret)
}

/// Non-zero triplets of a dense matrix, column by column
pub fn dense_to_triplets(xx: &DMatrix<f32>) -> Vec<(u64, u64, f32)> {
    let mut ret = vec![];
    for (j, xx_j) in xx.column_iter().enumerate() {
        for (i, &x) in xx_j.iter().enumerate() {
            if x != 0.0 {
                ret.push((i as u64, j as u64, x));
            }
        }
    }
    ret
}
