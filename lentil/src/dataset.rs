use crate::common::*;
use fnv::FnvHashMap as HashMap;
use matrix_util::traits::MatOps;
use serde::Serialize;

/// A single annotation attached to a feature or a cell
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnnotValue {
    Flag(bool),
    Number(f64),
    Text(Box<str>),
}

pub type Annotations = BTreeMap<Box<str>, AnnotValue>;

/// What the values of a dataset hold
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ValueScale {
    /// non-negative raw counts
    Counts,
    /// log-transformed normalized expression
    LogExpression,
}

/// A `features x cells` matrix with names, per-cell batch labels,
/// annotations, and reduced representations (`k x cells` each).
///
/// A `Dataset` never changes once built. The `with_*` methods return
/// a new dataset that shares every part it does not touch with the
/// old one; a part is copied only when it is written.
#[derive(Clone, Debug)]
pub struct Dataset {
    name: Box<str>,
    values: Arc<Mat>,
    scale: ValueScale,
    features: Arc<Vec<Box<str>>>,
    cells: Arc<Vec<Box<str>>>,
    cell_batches: Arc<Vec<Box<str>>>,
    feature_metadata: Arc<BTreeMap<Box<str>, Annotations>>,
    cell_metadata: Arc<BTreeMap<Box<str>, Annotations>>,
    reduced: Arc<BTreeMap<Box<str>, Mat>>,
}

impl Dataset {
    /// A dataset of one batch; every cell is labelled `batch`
    ///
    /// * `batch` - batch identifier, also the name of the dataset
    /// * `features` - row names, unique and non-empty
    /// * `cells` - column names, unique
    /// * `values` - `features.len() x cells.len()` matrix
    pub fn new(
        batch: &str,
        features: Vec<Box<str>>,
        cells: Vec<Box<str>>,
        values: Mat,
        scale: ValueScale,
    ) -> Result<Self> {
        let cell_batches = vec![Box::<str>::from(batch); cells.len()];
        Self::from_parts(batch, features, cells, cell_batches, values, scale)
    }

    /// A dataset whose cells may come from different batches
    pub fn from_parts(
        name: &str,
        features: Vec<Box<str>>,
        cells: Vec<Box<str>>,
        cell_batches: Vec<Box<str>>,
        values: Mat,
        scale: ValueScale,
    ) -> Result<Self> {
        validate_names(name, "feature", &features)?;
        validate_names(name, "cell", &cells)?;

        if features.is_empty() {
            return Err(IntegrationError::invalid_dataset(name, "no features"));
        }

        if values.nrows() != features.len() || values.ncols() != cells.len() {
            return Err(IntegrationError::invalid_dataset(
                name,
                format!(
                    "values are {} x {} but there are {} features and {} cells",
                    values.nrows(),
                    values.ncols(),
                    features.len(),
                    cells.len()
                ),
            ));
        }

        if cell_batches.len() != cells.len() {
            return Err(IntegrationError::invalid_dataset(
                name,
                format!(
                    "{} batch labels for {} cells",
                    cell_batches.len(),
                    cells.len()
                ),
            ));
        }

        validate_values(name, &values, scale)?;

        Ok(Dataset {
            name: name.into(),
            values: Arc::new(values),
            scale,
            features: Arc::new(features),
            cells: Arc::new(cells),
            cell_batches: Arc::new(cell_batches),
            feature_metadata: Arc::new(BTreeMap::new()),
            cell_metadata: Arc::new(BTreeMap::new()),
            reduced: Arc::new(BTreeMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &Mat {
        &self.values
    }

    pub fn scale(&self) -> ValueScale {
        self.scale
    }

    pub fn features(&self) -> &[Box<str>] {
        &self.features
    }

    pub fn cells(&self) -> &[Box<str>] {
        &self.cells
    }

    pub fn cell_batches(&self) -> &[Box<str>] {
        &self.cell_batches
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Distinct batch labels in sorted order
    pub fn batches(&self) -> Vec<Box<str>> {
        let set: BTreeSet<&Box<str>> = self.cell_batches.iter().collect();
        set.into_iter().cloned().collect()
    }

    pub fn feature_metadata(&self) -> &BTreeMap<Box<str>, Annotations> {
        &self.feature_metadata
    }

    pub fn cell_metadata(&self) -> &BTreeMap<Box<str>, Annotations> {
        &self.cell_metadata
    }

    pub fn reduced(&self, name: &str) -> Option<&Mat> {
        self.reduced.get(name)
    }

    pub fn reduced_names(&self) -> Vec<&str> {
        self.reduced.keys().map(|x| x.as_ref()).collect()
    }

    /// feature name -> row index
    pub fn feature_index(&self) -> HashMap<&str, usize> {
        self.features
            .iter()
            .enumerate()
            .map(|(i, x)| (x.as_ref(), i))
            .collect()
    }

    /// Row indices of `features`, in that order
    pub fn feature_positions(&self, features: &[Box<str>]) -> Result<Vec<usize>> {
        let index = self.feature_index();
        features
            .iter()
            .map(|f| {
                index
                    .get(f.as_ref())
                    .copied()
                    .ok_or_else(|| IntegrationError::UnknownFeature { feature: f.clone() })
            })
            .collect()
    }

    /// True if both datasets point at the same value matrix
    pub fn shares_values_with(&self, other: &Dataset) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }

    /// Keep only `features`, in that order. Feature annotations of
    /// dropped features go too; cells and their annotations stay.
    pub fn subset_features(&self, features: &[Box<str>]) -> Result<Self> {
        let rows = self.feature_positions(features)?;
        validate_names(&self.name, "feature", features)?;
        if features.is_empty() {
            return Err(IntegrationError::invalid_dataset(&self.name, "no features"));
        }

        if rows.iter().enumerate().all(|(i, &r)| i == r) && rows.len() == self.num_features() {
            return Ok(self.clone());
        }

        let values = self.values.subset_rows(&rows);
        let keep: BTreeSet<&str> = features.iter().map(|x| x.as_ref()).collect();
        let feature_metadata = self
            .feature_metadata
            .iter()
            .filter(|(k, _)| keep.contains(k.as_ref()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Dataset {
            values: Arc::new(values),
            features: Arc::new(features.to_vec()),
            feature_metadata: Arc::new(feature_metadata),
            ..self.clone()
        })
    }

    /// Replace the value matrix by one of the same shape
    pub fn with_values(&self, values: Mat, scale: ValueScale) -> Result<Self> {
        if values.shape() != self.values.shape() {
            return Err(IntegrationError::invalid_dataset(
                &self.name,
                format!(
                    "new values are {:?}, expected {:?}",
                    values.shape(),
                    self.values.shape()
                ),
            ));
        }
        validate_values(&self.name, &values, scale)?;
        Ok(Dataset {
            values: Arc::new(values),
            scale,
            ..self.clone()
        })
    }

    /// Attach a `k x cells` representation under `name`
    pub fn with_reduced(&self, name: &str, mat: Mat) -> Result<Self> {
        if mat.ncols() != self.num_cells() {
            return Err(IntegrationError::invalid_dataset(
                &self.name,
                format!(
                    "representation '{}' has {} columns for {} cells",
                    name,
                    mat.ncols(),
                    self.num_cells()
                ),
            ));
        }
        let mut ret = self.clone();
        Arc::make_mut(&mut ret.reduced).insert(name.into(), mat);
        Ok(ret)
    }

    /// Set `key` on every feature listed in `values`; unknown features
    /// are an error
    pub fn with_feature_annotations<I>(&self, key: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Box<str>, AnnotValue)>,
    {
        let index = self.feature_index();
        let mut meta = (*self.feature_metadata).clone();
        for (feature, value) in values {
            if !index.contains_key(feature.as_ref()) {
                return Err(IntegrationError::UnknownFeature { feature });
            }
            meta.entry(feature).or_default().insert(key.into(), value);
        }
        Ok(Dataset {
            feature_metadata: Arc::new(meta),
            ..self.clone()
        })
    }

    /// Replace all cell annotations; every key must be a known cell
    pub fn with_cell_metadata(&self, meta: BTreeMap<Box<str>, Annotations>) -> Result<Self> {
        let known: BTreeSet<&str> = self.cells.iter().map(|x| x.as_ref()).collect();
        if let Some(cell) = meta.keys().find(|c| !known.contains(c.as_ref())) {
            return Err(IntegrationError::invalid_dataset(
                &self.name,
                format!("unknown cell '{}'", cell),
            ));
        }
        Ok(Dataset {
            cell_metadata: Arc::new(meta),
            ..self.clone()
        })
    }

    /// Set `key` on every cell listed in `values`; unknown cells are
    /// an error
    pub fn with_cell_annotations<I>(&self, key: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Box<str>, AnnotValue)>,
    {
        let known: BTreeSet<&str> = self.cells.iter().map(|x| x.as_ref()).collect();
        let mut meta = (*self.cell_metadata).clone();
        for (cell, value) in values {
            if !known.contains(cell.as_ref()) {
                return Err(IntegrationError::invalid_dataset(
                    &self.name,
                    format!("unknown cell '{}'", cell),
                ));
            }
            meta.entry(cell).or_default().insert(key.into(), value);
        }
        Ok(Dataset {
            cell_metadata: Arc::new(meta),
            ..self.clone()
        })
    }
}

fn validate_names(dataset: &str, what: &str, names: &[Box<str>]) -> Result<()> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for x in names {
        if x.is_empty() {
            return Err(IntegrationError::invalid_dataset(
                dataset,
                format!("empty {} name", what),
            ));
        }
        if !seen.insert(x.as_ref()) {
            return Err(IntegrationError::invalid_dataset(
                dataset,
                format!("duplicate {} '{}'", what, x),
            ));
        }
    }
    Ok(())
}

fn validate_values(dataset: &str, values: &Mat, scale: ValueScale) -> Result<()> {
    if let Some(x) = values.iter().find(|x| !x.is_finite()) {
        return Err(IntegrationError::invalid_dataset(
            dataset,
            format!("non-finite value {}", x),
        ));
    }
    if scale == ValueScale::Counts {
        if let Some(x) = values.iter().find(|&&x| x < 0.0) {
            return Err(IntegrationError::invalid_dataset(
                dataset,
                format!("negative count {}", x),
            ));
        }
    }
    Ok(())
}
