/// Column/row transformations of a `features x cells` matrix
pub trait MatOps {
    type Mat;
    type Scalar;

    /// `Y[,j] = X[,j] / norm(X[,j])`; all-zero columns stay zero
    fn cosine_normalize_columns_inplace(&mut self);
    fn cosine_normalize_columns(&self) -> Self::Mat;

    /// Subtract the mean of each row
    fn centre_rows_inplace(&mut self);
    fn centre_rows(&self) -> Self::Mat;

    /// Keep the rows in `rows`, in that order
    fn subset_rows(&self, rows: &[usize]) -> Self::Mat;
}

/// Operations to sample random matrices with a fixed seed so that
/// every run sees the same draws
pub trait SampleOps {
    type Mat;

    /// Sample a matrix from `U(0,1)`
    fn runif_seeded(dd: usize, nn: usize, seed: u64) -> Self::Mat;

    /// Sample a matrix from `N(0,1)`
    fn rnorm_seeded(dd: usize, nn: usize, seed: u64) -> Self::Mat;
}

/// Distances between the columns of two matrices
pub trait DistanceOps {
    type Scalar;
    type Other;

    /// Squared Euclidean distance between `self[:,i]` and `other[:,j]`
    fn column_sq_distance(&self, i: usize, other: &Self::Other, j: usize) -> Self::Scalar;
}

/// Read and write matrices from and to delimited files
pub trait IoOps {
    type Mat;

    fn read_file_delim(file: &str, delim: char, skip: Option<usize>) -> anyhow::Result<Self::Mat>;

    fn from_tsv(tsv_file: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, '\t', skip)
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }
}
