use crate::common_io::*;
use crate::traits::IoOps;
use nalgebra::DMatrix;
use std::io::Write;

/// A matrix along with the names of its rows and columns
pub struct MatWithNames {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub mat: DMatrix<f32>,
}

impl MatWithNames {
    /// Read a delimited table whose first line holds the column names
    /// (preceded by a corner label) and whose first column holds the
    /// row names
    ///
    /// ```text
    /// gene  cell_1  cell_2
    /// A     0       3
    /// B     1       0
    /// ```
    pub fn read_named(file: &str, delim: Option<char>) -> anyhow::Result<Self> {
        let ReadLinesOut { lines, header } = read_lines_of_words(file, delim, true)?;

        if header.len() < 2 {
            anyhow::bail!("{}: header needs a corner label and column names", file);
        }

        let cols: Vec<Box<str>> = header[1..].to_vec();
        let ncols = cols.len();
        let nrows = lines.len();

        let mut rows = Vec::with_capacity(nrows);
        let mut data = Vec::with_capacity(nrows * ncols);
        for (i, words) in lines.into_iter().enumerate() {
            if words.len() != ncols + 1 {
                anyhow::bail!(
                    "{}: line {} has {} fields, expected {}",
                    file,
                    i + 2,
                    words.len(),
                    ncols + 1
                );
            }
            let mut words = words.into_iter();
            if let Some(name) = words.next() {
                rows.push(name);
            }
            for w in words {
                data.push(w.parse::<f32>().map_err(|e| {
                    anyhow::anyhow!("{}: line {}: cannot parse '{}': {}", file, i + 2, w, e)
                })?);
            }
        }

        Ok(MatWithNames {
            rows,
            cols,
            mat: DMatrix::<f32>::from_row_iterator(nrows, ncols, data),
        })
    }

    /// Write the matrix as a delimited table with a header line
    pub fn write_named(&self, file: &str, corner: &str, delim: &str) -> anyhow::Result<()> {
        write_named_matrix(&self.mat, &self.rows, &self.cols, corner, file, delim)
    }
}

/// Write `mat` with row and column names
/// * `corner` - label above the row names
pub fn write_named_matrix(
    mat: &DMatrix<f32>,
    rows: &[Box<str>],
    cols: &[Box<str>],
    corner: &str,
    file: &str,
    delim: &str,
) -> anyhow::Result<()> {
    if rows.len() != mat.nrows() || cols.len() != mat.ncols() {
        anyhow::bail!(
            "names ({} x {}) do not match the matrix ({} x {})",
            rows.len(),
            cols.len(),
            mat.nrows(),
            mat.ncols()
        );
    }

    mkdir(file)?;
    let mut buf = open_buf_writer(file)?;

    write!(buf, "{}", corner)?;
    for c in cols {
        write!(buf, "{}{}", delim, c)?;
    }
    writeln!(buf)?;

    for (r, row) in rows.iter().zip(mat.row_iter()) {
        write!(buf, "{}", r)?;
        for x in row.iter() {
            write!(buf, "{}{}", delim, x)?;
        }
        writeln!(buf)?;
    }
    buf.flush()?;
    Ok(())
}

impl IoOps for DMatrix<f32> {
    type Mat = Self;

    fn read_file_delim(file: &str, delim: char, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        let lines = read_lines_of_words(file, Some(delim), false)?.lines;
        let lines = &lines[skip.unwrap_or(0).min(lines.len())..];

        if lines.is_empty() {
            return Err(anyhow::anyhow!("No data in file {}", file));
        }

        let ncols = lines[0].len();
        let nrows = lines.len();
        let mut data = Vec::with_capacity(nrows * ncols);
        for words in lines {
            if words.len() != ncols {
                anyhow::bail!("{}: ragged rows", file);
            }
            for w in words {
                data.push(w.parse::<f32>()?);
            }
        }

        Ok(DMatrix::<f32>::from_row_iterator(nrows, ncols, data))
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()> {
        let lines = self
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|x| format!("{}", *x))
                    .collect::<Vec<String>>()
                    .join(delim)
            })
            .collect::<Vec<_>>();
        mkdir(file)?;
        write_lines(&lines, file)
    }
}
