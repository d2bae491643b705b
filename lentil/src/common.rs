pub use log::{debug, info, warn};
pub use std::collections::{BTreeMap, BTreeSet};
pub use std::sync::Arc;

pub use crate::error::{IntegrationError, Result};

pub type Mat = nalgebra::DMatrix<f32>;
pub type DVec = nalgebra::DVector<f32>;

/// Batch identifier -> its data, iterated in identifier order
pub type BatchMap<T> = BTreeMap<Box<str>, T>;

/// Name of the reduced representation holding corrected values
pub const CORRECTED: &str = "corrected";

/// Name of the reduced representation holding principal components
pub const PCA: &str = "pca";

pub const DEFAULT_KNN: usize = 20;
pub const DEFAULT_SIGMA: f32 = 0.1;
pub const DEFAULT_SEED: u64 = 42;
