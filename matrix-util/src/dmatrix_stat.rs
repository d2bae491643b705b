use nalgebra::{DMatrix, DVector, DVectorView};

/// A container to keep track of per-row sufficient statistics while
/// visiting the columns of a `features x cells` matrix
///
/// Values that are not finite are skipped, so each row keeps its own
/// count of observations.
#[derive(Clone, Debug)]
pub struct RowStatistics {
    npos: DVector<f64>,
    s0: DVector<f64>,
    s1: DVector<f64>,
    s2: DVector<f64>,
}

impl RowStatistics {
    /// Create a new `RowStatistics` for `nrows` rows
    ///
    /// ```
    /// use matrix_util::dmatrix_stat::RowStatistics;
    /// let stat = RowStatistics::new(10);
    /// assert_eq!(stat.num_rows(), 10);
    /// ```
    pub fn new(nrows: usize) -> Self {
        Self {
            npos: DVector::zeros(nrows),
            s0: DVector::zeros(nrows),
            s1: DVector::zeros(nrows),
            s2: DVector::zeros(nrows),
        }
    }

    /// Statistics of every row of `xx` over its columns
    pub fn from_columns(xx: &DMatrix<f32>) -> Self {
        let mut ret = Self::new(xx.nrows());
        for xx_j in xx.column_iter() {
            ret.add_column(&xx_j);
        }
        ret
    }

    pub fn add_column(&mut self, xx_j: &DVectorView<f32>) {
        debug_assert_eq!(xx_j.len(), self.num_rows());
        for (i, &x) in xx_j.iter().enumerate() {
            if !x.is_finite() {
                continue;
            }
            let x = x as f64;
            self.s0[i] += 1.0;
            self.s1[i] += x;
            self.s2[i] += x * x;
            if x > 0.0 {
                self.npos[i] += 1.0;
            }
        }
    }

    /// Pool another set of statistics over the same rows
    pub fn merge(&mut self, other: &Self) -> anyhow::Result<()> {
        if other.num_rows() != self.num_rows() {
            anyhow::bail!(
                "cannot merge statistics of {} rows into {} rows",
                other.num_rows(),
                self.num_rows()
            );
        }
        self.npos += &other.npos;
        self.s0 += &other.s0;
        self.s1 += &other.s1;
        self.s2 += &other.s2;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.npos.fill(0.0);
        self.s0.fill(0.0);
        self.s1.fill(0.0);
        self.s2.fill(0.0);
    }

    pub fn num_rows(&self) -> usize {
        self.s0.len()
    }

    /// Number of finite observations per row
    pub fn count(&self) -> &DVector<f64> {
        &self.s0
    }

    /// Frequency of positive values. For a count matrix, this is the
    /// number of non-zero values
    pub fn count_positives(&self) -> &DVector<f64> {
        &self.npos
    }

    pub fn sum(&self) -> &DVector<f64> {
        &self.s1
    }

    pub fn mean(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.num_rows(),
            self.s1
                .iter()
                .zip(self.s0.iter())
                .map(|(&s1, &s0)| if s0 > 0.0 { s1 / s0 } else { 0.0 }),
        )
    }

    /// Unbiased sample variance, `n - 1` in the denominator; rows
    /// with fewer than two observations get zero
    pub fn variance(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.num_rows(),
            (0..self.num_rows()).map(|i| {
                let nn = self.s0[i];
                if nn < 2.0 {
                    return 0.0;
                }
                let ss = self.s2[i] - self.s1[i] * self.s1[i] / nn;
                (ss / (nn - 1.0)).max(0.0)
            }),
        )
    }

    pub fn std(&self) -> DVector<f64> {
        self.variance().map(f64::sqrt)
    }
}
