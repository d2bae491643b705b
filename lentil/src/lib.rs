pub mod combine_var; // cell-count weighted consensus of per-batch variance
pub mod common;
pub mod correct; // ordered, sequential batch correction
pub mod dataset; // features x cells matrix with names and annotations
pub mod error;
pub mod feature_selection; // blacklist and highly variable features
pub mod harmonize; // feature intersection across batches
pub mod io; // load batches, write results
pub mod merge_order; // deterministic order of batches
pub mod mnn; // mutual nearest neighbour correction of one batch
pub mod normalize; // multi-batch log normalisation
pub mod pca; // principal components of corrected values
pub mod pipeline; // all stages in one call
pub mod simulate; // synthetic batches with batch effects
pub mod variance; // mean-variance trend decomposition
