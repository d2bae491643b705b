use crate::traits::DistanceOps;
use indicatif::ParallelProgressIterator;
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Column indices of the neighbours in the other matrix with their
/// Euclidean distances, closest first
pub type Neighbours = Vec<(usize, f32)>;

/// How to look up nearest neighbours between two sets of columns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KnnSearch {
    /// brute force over all pairs; ties broken by column index
    Exact,
    /// approximate search on an HNSW graph built with a fixed seed
    Hnsw { seed: u64 },
}

impl KnnSearch {
    /// For each column of `query`, find `knn` nearest columns of `against`
    pub fn search(
        &self,
        query: &DMatrix<f32>,
        against: &DMatrix<f32>,
        knn: usize,
    ) -> anyhow::Result<Vec<Neighbours>> {
        match self {
            KnnSearch::Exact => exact_knn_columns(query, against, knn),
            KnnSearch::Hnsw { seed } => hnsw_knn_columns(query, against, knn, *seed),
        }
    }
}

/// Exact k-nearest neighbour search over columns
///
/// * `query` - `d x n` matrix, each column is a point
/// * `against` - `d x m` matrix, each column is a point
/// * `knn` - number of neighbours (capped at `m`)
///
/// The result has one entry per query column, in column order,
/// regardless of how rayon schedules the work.
pub fn exact_knn_columns(
    query: &DMatrix<f32>,
    against: &DMatrix<f32>,
    knn: usize,
) -> anyhow::Result<Vec<Neighbours>> {
    if query.nrows() != against.nrows() {
        anyhow::bail!(
            "dimension mismatch: {} vs {} rows",
            query.nrows(),
            against.nrows()
        );
    }

    let nquery = knn.min(against.ncols());
    let nn = query.ncols();

    Ok((0..nn)
        .into_par_iter()
        .progress_count(nn as u64)
        .map(|j| {
            let mut dist: Vec<(usize, f32)> = (0..against.ncols())
                .map(|i| (i, query.column_sq_distance(j, against, i)))
                .collect();
            dist.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
            dist.truncate(nquery);
            dist.into_iter().map(|(i, d)| (i, d.sqrt())).collect()
        })
        .collect())
}

/// Approximate k-nearest neighbour search over columns with an HNSW
/// index of `against`
pub fn hnsw_knn_columns(
    query: &DMatrix<f32>,
    against: &DMatrix<f32>,
    knn: usize,
    seed: u64,
) -> anyhow::Result<Vec<Neighbours>> {
    if query.nrows() != against.nrows() {
        anyhow::bail!(
            "dimension mismatch: {} vs {} rows",
            query.nrows(),
            against.nrows()
        );
    }

    let dict = ColumnDict::from_matrix(against, seed, knn);
    let nn = query.ncols();

    Ok((0..nn)
        .into_par_iter()
        .progress_count(nn as u64)
        .map(|j| {
            let point = VecPoint {
                data: query.column(j).iter().cloned().collect(),
            };
            dict.search(&point, knn)
        })
        .collect())
}

/// Mutual nearest pairs `(a, b)`: `b` is among the neighbours of `a`
/// and `a` is among the neighbours of `b`
///
/// * `a_to_b` - neighbours in `B` for each column of `A`
/// * `b_to_a` - neighbours in `A` for each column of `B`
///
/// Sorted by `b`, then `a`.
pub fn mutual_nearest_pairs(a_to_b: &[Neighbours], b_to_a: &[Neighbours]) -> Vec<(usize, usize)> {
    let mut pairs: Vec<(usize, usize)> = a_to_b
        .iter()
        .enumerate()
        .flat_map(|(a, nn_a)| {
            nn_a.iter()
                .filter(move |&&(b, _)| {
                    b_to_a
                        .get(b)
                        .map(|nn_b| nn_b.iter().any(|&(x, _)| x == a))
                        .unwrap_or(false)
                })
                .map(move |&(b, _)| (a, b))
        })
        .collect();

    pairs.sort_by_key(|&(a, b)| (b, a));
    pairs.dedup();
    pairs
}

/// A dictionary (HnswMap wrapper) for fast column look-up
///
pub struct ColumnDict {
    dict: instant_distance::HnswMap<VecPoint, usize>,
    size: usize,
}

impl ColumnDict {
    /// Index the columns of `data`
    /// * `seed` - seed for the layer assignment of the HNSW graph
    /// * `knn` - the largest number of neighbours we will ask for
    pub fn from_matrix(data: &DMatrix<f32>, seed: u64, knn: usize) -> Self {
        use instant_distance::Builder;

        let nn = data.ncols();
        let points: Vec<VecPoint> = data
            .column_iter()
            .map(|x| VecPoint {
                data: x.iter().cloned().collect(),
            })
            .collect();
        let names: Vec<usize> = (0..nn).collect();

        let dict = Builder::default()
            .seed(seed)
            .ef_search(knn.max(100))
            .build(points, names);

        ColumnDict { dict, size: nn }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// `knn` nearest columns to `query`, closest first
    pub fn search(&self, query: &VecPoint, knn: usize) -> Neighbours {
        use instant_distance::Search;

        let nquery = knn.min(self.size);
        let mut search = Search::default();
        let mut ret: Neighbours = self
            .dict
            .search(query, &mut search)
            .take(nquery)
            .map(|item| (*item.value, item.distance))
            .collect();
        ret.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        ret
    }
}

#[derive(Clone, Debug)]
/// a wrapper for Vec<f32>
pub struct VecPoint {
    pub data: Vec<f32>,
}

impl instant_distance::Point for VecPoint {
    fn distance(&self, other: &Self) -> f32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }
}
