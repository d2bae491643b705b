pub mod common_io; // gzip-aware line readers and writers
pub mod dmatrix_io; // dense matrices with row and column names
pub mod dmatrix_rsvd; // seeded randomized SVD
pub mod dmatrix_stat; // per-row running statistics over columns
pub mod dmatrix_util;
pub mod knn_match; // exact and HNSW nearest neighbours between column sets
pub mod mtx_io; // MatrixMarket triplets
pub mod traits;
