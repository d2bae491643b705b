use crate::common::*;
use crate::dataset::{Dataset, ValueScale};
use fnv::FnvHashMap as HashMap;
use matrix_util::dmatrix_stat::RowStatistics;
use rayon::prelude::*;
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::cmp::Ordering;

/// Variance of one feature split into technical and biological parts
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FeatureVariance {
    pub mean: f64,
    pub total: f64,
    pub tech: f64,
    pub bio: f64,
    pub p_value: f64,
    pub fdr: f64,
}

/// Per-feature variance decomposition, rows in `features` order
#[derive(Clone, Debug)]
pub struct VarianceDecomposition {
    features: Vec<Box<str>>,
    stats: Vec<FeatureVariance>,
    num_cells: usize,
}

impl VarianceDecomposition {
    pub fn new(
        features: Vec<Box<str>>,
        stats: Vec<FeatureVariance>,
        num_cells: usize,
    ) -> Result<Self> {
        if features.len() != stats.len() {
            return Err(IntegrationError::Numerical(format!(
                "{} features but {} variance rows",
                features.len(),
                stats.len()
            )));
        }
        Ok(Self {
            features,
            stats,
            num_cells,
        })
    }

    pub fn features(&self) -> &[Box<str>] {
        &self.features
    }

    pub fn stats(&self) -> &[FeatureVariance] {
        &self.stats
    }

    /// number of cells the statistics were estimated from
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Box<str>, &FeatureVariance)> {
        self.features.iter().zip(self.stats.iter())
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureVariance> {
        self.features
            .iter()
            .position(|x| x.as_ref() == feature)
            .map(|i| &self.stats[i])
    }

    /// feature name -> statistics
    pub fn to_map(&self) -> HashMap<&str, &FeatureVariance> {
        self.iter().map(|(f, v)| (f.as_ref(), v)).collect()
    }

    /// Tab-separated lines with a header
    pub fn to_lines(&self) -> Vec<Box<str>> {
        let mut ret: Vec<Box<str>> = vec!["feature\tmean\ttotal\ttech\tbio\tp_value\tfdr".into()];
        ret.extend(self.iter().map(|(f, v)| {
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                f, v.mean, v.total, v.tech, v.bio, v.p_value, v.fdr
            )
            .into_boxed_str()
        }));
        ret
    }
}

/// Splits per-feature variance of log-expression values (`features x
/// cells`) into technical and biological components
pub trait VarianceModel: Sync {
    fn decompose(&self, features: &[Box<str>], logexpr: &Mat) -> Result<VarianceDecomposition>;
}

/// Technical variance is the LOWESS trend of variance on mean, fitted
/// across all features
#[derive(Clone, Debug)]
pub struct TrendVarianceModel {
    /// fraction of features in each local fit
    pub span: f64,
    /// number of bisquare reweighting rounds
    pub robustness_iter: usize,
    /// lower bound on the fitted technical variance
    pub min_tech: f64,
}

impl Default for TrendVarianceModel {
    fn default() -> Self {
        Self {
            span: 0.3,
            robustness_iter: 3,
            min_tech: 1e-8,
        }
    }
}

impl VarianceModel for TrendVarianceModel {
    fn decompose(&self, features: &[Box<str>], logexpr: &Mat) -> Result<VarianceDecomposition> {
        if features.len() != logexpr.nrows() {
            return Err(IntegrationError::Numerical(format!(
                "{} features for {} rows",
                features.len(),
                logexpr.nrows()
            )));
        }

        let nn = logexpr.ncols();
        if nn < 2 {
            return Err(IntegrationError::Numerical(format!(
                "variance needs at least 2 cells, got {}",
                nn
            )));
        }

        if !(self.span > 0.0 && self.span <= 1.0) {
            return Err(IntegrationError::Numerical(format!(
                "span must be in (0, 1], got {}",
                self.span
            )));
        }

        let stat = RowStatistics::from_columns(logexpr);
        let mean: Vec<f64> = stat.mean().iter().copied().collect();
        let total: Vec<f64> = stat.variance().iter().copied().collect();

        let trend = lowess(&mean, &total, self.span, self.robustness_iter);
        let df = (nn - 1) as f64;

        let mut stats = mean
            .iter()
            .zip(total.iter())
            .zip(trend.iter())
            .map(|((&mean, &total), &fit)| {
                let tech = fit.max(self.min_tech);
                Ok(FeatureVariance {
                    mean,
                    total,
                    tech,
                    bio: total - tech,
                    p_value: chisq_upper_tail(df, total, tech)?,
                    fdr: f64::NAN,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        fill_fdr(&mut stats);
        VarianceDecomposition::new(features.to_vec(), stats, nn)
    }
}

/// `P(chi2_df > df * total / tech)`; a feature that does not vary at
/// all gets 1
pub fn chisq_upper_tail(df: f64, total: f64, tech: f64) -> Result<f64> {
    if total <= 0.0 {
        return Ok(1.0);
    }
    let chisq = ChiSquared::new(df).map_err(|e| IntegrationError::Numerical(e.to_string()))?;
    Ok(chisq.sf(df * total / tech))
}

/// Replace `fdr` by the Benjamini-Hochberg adjustment of `p_value`
pub fn fill_fdr(stats: &mut [FeatureVariance]) {
    let pv: Vec<f64> = stats.iter().map(|x| x.p_value).collect();
    for (x, q) in stats.iter_mut().zip(benjamini_hochberg(&pv)) {
        x.fdr = q;
    }
}

/// Benjamini-Hochberg adjusted p-values in the input order. Only the
/// finite p-values count as tests; the rest get `NaN`.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..pvalues.len())
        .filter(|&i| pvalues[i].is_finite())
        .collect();
    order.sort_by(|&a, &b| {
        pvalues[a]
            .partial_cmp(&pvalues[b])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let ntest = order.len() as f64;
    let mut ret = vec![f64::NAN; pvalues.len()];
    let mut running = 1.0_f64;
    for (rank, &i) in order.iter().enumerate().rev() {
        let q = pvalues[i] * ntest / (rank + 1) as f64;
        running = running.min(q);
        ret[i] = running.clamp(0.0, 1.0);
    }
    ret
}

/// Decompose the variance of one batch with the default trend model
pub fn estimate_variance(dataset: &Dataset) -> Result<VarianceDecomposition> {
    estimate_variance_with(dataset, &TrendVarianceModel::default())
}

pub fn estimate_variance_with<M>(dataset: &Dataset, model: &M) -> Result<VarianceDecomposition>
where
    M: VarianceModel + ?Sized,
{
    if dataset.scale() != ValueScale::LogExpression {
        return Err(IntegrationError::invalid_dataset(
            dataset.name(),
            "variance is modelled on log-expression values",
        ));
    }
    if dataset.num_cells() < 2 {
        return Err(IntegrationError::invalid_dataset(
            dataset.name(),
            format!("{} cells, at least 2 needed", dataset.num_cells()),
        ));
    }
    let ret = model.decompose(dataset.features(), dataset.values())?;
    if ret.features() != dataset.features() {
        return Err(IntegrationError::FeatureMismatch {
            batch: dataset.name().into(),
            reference: "variance model output".into(),
        });
    }
    Ok(ret)
}

/// Decompose each batch independently; batches run in parallel and
/// come back keyed by batch
pub fn estimate_variance_per_batch<M>(
    datasets: &BatchMap<Dataset>,
    model: &M,
) -> Result<BatchMap<VarianceDecomposition>>
where
    M: VarianceModel + ?Sized,
{
    if datasets.is_empty() {
        return Err(IntegrationError::NoDatasets);
    }
    let ret = datasets
        .par_iter()
        .map(|(batch, data)| Ok((batch.clone(), estimate_variance_with(data, model)?)))
        .collect::<Result<BatchMap<_>>>()?;

    for (batch, decomp) in ret.iter() {
        let nsig = decomp.stats().iter().filter(|x| x.fdr < 0.05).count();
        info!(
            "{}: {} features, {} with FDR < 0.05",
            batch,
            decomp.len(),
            nsig
        );
    }
    Ok(ret)
}

/// Locally weighted linear regression of `yy` on `xx` with a tricube
/// kernel over the `span * n` nearest points, followed by
/// `robustness_iter` bisquare reweighting rounds (Cleveland 1979).
/// Returns the fitted values in the input order.
pub fn lowess(xx: &[f64], yy: &[f64], span: f64, robustness_iter: usize) -> Vec<f64> {
    let n = xx.len();
    if n == 0 {
        return vec![];
    }
    if n == 1 {
        return vec![yy[0]];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| xx[a].partial_cmp(&xx[b]).unwrap_or(Ordering::Equal).then(a.cmp(&b)));
    let xs: Vec<f64> = order.iter().map(|&i| xx[i]).collect();
    let ys: Vec<f64> = order.iter().map(|&i| yy[i]).collect();

    let width = ((span * n as f64).ceil() as usize).clamp(2, n);
    let windows = nearest_windows(&xs, width);

    let mut robust = vec![1.0; n];
    let mut fitted = vec![0.0; n];

    for iter in 0..=robustness_iter {
        fitted = (0..n)
            .into_par_iter()
            .map(|i| local_linear_fit(&xs, &ys, &robust, i, windows[i], width))
            .collect();

        if iter == robustness_iter {
            break;
        }

        let resid: Vec<f64> = ys.iter().zip(fitted.iter()).map(|(y, f)| y - f).collect();
        let mut abs_resid: Vec<f64> = resid.iter().map(|x| x.abs()).collect();
        abs_resid.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mad = abs_resid[n / 2];
        let scale = ys.iter().fold(0.0_f64, |acc, y| acc.max(y.abs()));
        if mad <= 1e-10 * scale {
            break;
        }
        for (w, r) in robust.iter_mut().zip(resid.iter()) {
            let u = r / (6.0 * mad);
            *w = if u.abs() < 1.0 { (1.0 - u * u).powi(2) } else { 0.0 };
        }
    }

    let mut ret = vec![0.0; n];
    for (k, &i) in order.iter().enumerate() {
        ret[i] = fitted[k];
    }
    ret
}

/// Start of the `width` points nearest to each sorted `xs[i]`
fn nearest_windows(xs: &[f64], width: usize) -> Vec<usize> {
    let n = xs.len();
    let mut lo = 0;
    let mut ret = Vec::with_capacity(n);
    for i in 0..n {
        while lo + width < n && xs[i] - xs[lo] > xs[lo + width] - xs[i] {
            lo += 1;
        }
        ret.push(lo);
    }
    ret
}

fn local_linear_fit(
    xs: &[f64],
    ys: &[f64],
    robust: &[f64],
    i: usize,
    lo: usize,
    width: usize,
) -> f64 {
    let x0 = xs[i];
    let range = lo..(lo + width);
    let h = range
        .clone()
        .map(|j| (xs[j] - x0).abs())
        .fold(0.0_f64, f64::max);

    let weights: Vec<f64> = range
        .clone()
        .map(|j| {
            let kern = if h > 0.0 {
                let u = ((xs[j] - x0).abs() / h).min(1.0);
                (1.0 - u * u * u).powi(3)
            } else {
                1.0
            };
            kern * robust[j]
        })
        .collect();

    let sw: f64 = weights.iter().sum();
    if sw <= 0.0 {
        return ys[i];
    }

    let (mut mx, mut my) = (0.0, 0.0);
    for (w, j) in weights.iter().zip(range.clone()) {
        mx += w * xs[j];
        my += w * ys[j];
    }
    mx /= sw;
    my /= sw;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (w, j) in weights.iter().zip(range) {
        let dx = xs[j] - mx;
        sxy += w * dx * (ys[j] - my);
        sxx += w * dx * dx;
    }

    if sxx <= f64::EPSILON * sw {
        my
    } else {
        my + sxy / sxx * (x0 - mx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use matrix_util::traits::SampleOps;

    #[test]
    fn lowess_follows_a_line() {
        let xx: Vec<f64> = (0..50).map(|i| i as f64 / 10.0).collect();
        let yy: Vec<f64> = xx.iter().map(|x| 2.0 * x + 1.0).collect();
        let fit = lowess(&xx, &yy, 0.3, 2);
        for (f, y) in fit.iter().zip(yy.iter()) {
            assert_abs_diff_eq!(*f, *y, epsilon = 1e-8);
        }
    }

    #[test]
    fn lowess_ignores_a_single_outlier() {
        let xx: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let mut yy = vec![1.0; 40];
        yy[20] = 100.0;
        let fit = lowess(&xx, &yy, 0.5, 3);
        assert_abs_diff_eq!(fit[20], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn bh_is_monotone_and_skips_nan() {
        let pv = vec![0.01, 0.04, f64::NAN, 0.03, 0.5];
        let q = benjamini_hochberg(&pv);
        assert!(q[2].is_nan());
        assert_abs_diff_eq!(q[0], 0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(q[3], 0.04 * 4.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(q[1], 0.04 * 4.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(q[4], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn a_feature_with_extra_spread_stands_out() -> anyhow::Result<()> {
        let nf = 60;
        let nn = 100;
        let mut xx = Mat::rnorm_seeded(nf, nn, 7) * 0.3;
        for (i, mut row) in xx.row_iter_mut().enumerate() {
            let mu = 1.0 + i as f32 * 0.05;
            row.apply(|x| *x += mu);
        }
        // two groups of cells for feature 0
        for j in 0..nn {
            xx[(0, j)] += if j % 2 == 0 { 3.0 } else { -3.0 };
        }

        let features: Vec<Box<str>> = (0..nf).map(|i| format!("g{}", i).into()).collect();
        let decomp = TrendVarianceModel::default().decompose(&features, &xx)?;

        assert_eq!(decomp.num_cells(), nn);
        let top = decomp.get("g0").unwrap();
        assert!(top.bio > 5.0);
        assert!(top.fdr < 1e-6);

        for (_, v) in decomp.iter().skip(1) {
            assert!(v.bio < top.bio);
            assert_abs_diff_eq!(v.bio, v.total - v.tech, epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn constant_features_are_not_significant() -> anyhow::Result<()> {
        let xx = Mat::from_element(3, 10, 2.0);
        let features: Vec<Box<str>> = vec!["a".into(), "b".into(), "c".into()];
        let decomp = TrendVarianceModel::default().decompose(&features, &xx)?;
        for v in decomp.stats() {
            assert_eq!(v.p_value, 1.0);
            assert_eq!(v.fdr, 1.0);
        }
        Ok(())
    }
}
