use thiserror::Error;

pub type Result<T> = std::result::Result<T, IntegrationError>;

/// Everything that can stop an integration run. These are problems
/// with the data or how the run was set up, so nothing here is
/// retried.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("no datasets were given")]
    NoDatasets,

    #[error("invalid dataset '{batch}': {reason}")]
    InvalidDataset { batch: Box<str>, reason: String },

    #[error("no feature is shared by all of the batches {batches:?}")]
    EmptyIntersection { batches: Vec<Box<str>> },

    #[error("features of '{batch}' differ from '{reference}'")]
    FeatureMismatch { batch: Box<str>, reference: Box<str> },

    #[error("no feature is left for finding neighbours")]
    EmptyFeatureSet,

    #[error("feature '{feature}' is not in the harmonized feature set")]
    UnknownFeature { feature: Box<str> },

    #[error(
        "merge order does not match the batches: missing {missing:?}, duplicated {duplicated:?}, unknown {unknown:?}"
    )]
    OrderMismatch {
        missing: Vec<Box<str>>,
        duplicated: Vec<Box<str>>,
        unknown: Vec<Box<str>>,
    },

    #[error("invalid priority for '{batch}': {reason}")]
    InvalidPriority { batch: Box<str>, reason: String },

    #[error("merge step {step}: no mutual nearest neighbours between '{batch}' and the reference")]
    InsufficientNeighbours { step: usize, batch: Box<str> },

    #[error("merge step {step}: invalid correction for '{batch}': {reason}")]
    InvalidCorrection {
        step: usize,
        batch: Box<str>,
        reason: String,
    },

    #[error("numerical failure: {0}")]
    Numerical(String),
}

impl IntegrationError {
    pub fn invalid_dataset(batch: &str, reason: impl Into<String>) -> Self {
        IntegrationError::InvalidDataset {
            batch: batch.into(),
            reason: reason.into(),
        }
    }
}
