use crate::common::*;
use crate::variance::VarianceDecomposition;
use std::cmp::Ordering;

/// Features that must never be used to find neighbours
#[derive(Clone, Debug, Default)]
pub struct Blacklist {
    ids: BTreeSet<Box<str>>,
    prefixes: Vec<Box<str>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            prefixes: vec![],
        }
    }

    /// Also exclude every feature that starts with `prefix`, ignoring case
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            self.prefixes.push(prefix.to_lowercase().into());
        }
        self
    }

    pub fn insert(&mut self, id: &str) {
        self.ids.insert(id.into());
    }

    pub fn contains(&self, feature: &str) -> bool {
        if self.ids.contains(feature) {
            return true;
        }
        if self.prefixes.is_empty() {
            return false;
        }
        let lower = feature.to_lowercase();
        self.prefixes.iter().any(|p| lower.starts_with(p.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.prefixes.is_empty()
    }

    pub fn num_ids(&self) -> usize {
        self.ids.len()
    }
}

/// Features to find neighbours with, most variable first
///
/// A feature is kept when it is not blacklisted, its biological
/// variance is above `bio_threshold` and its FDR is below
/// `fdr_threshold`. Features with non-finite statistics are never
/// kept. Ties in `bio` are broken by feature id. The result may be
/// empty.
pub fn select_features(
    decomp: &VarianceDecomposition,
    blacklist: &Blacklist,
    bio_threshold: f64,
    fdr_threshold: f64,
) -> Vec<Box<str>> {
    let mut kept: Vec<(&Box<str>, f64)> = decomp
        .iter()
        .filter(|(f, v)| {
            v.bio.is_finite()
                && v.fdr.is_finite()
                && v.bio > bio_threshold
                && v.fdr < fdr_threshold
                && !blacklist.contains(f)
        })
        .map(|(f, v)| (f, v.bio))
        .collect();

    kept.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let nblack = decomp.features().iter().filter(|f| blacklist.contains(f)).count();
    info!(
        "selected {} of {} features ({} blacklisted)",
        kept.len(),
        decomp.len(),
        nblack
    );

    kept.into_iter().map(|(f, _)| f.clone()).collect()
}

/// The first `n_top` of [`select_features`]
pub fn select_top_features(
    decomp: &VarianceDecomposition,
    blacklist: &Blacklist,
    bio_threshold: f64,
    fdr_threshold: f64,
    n_top: usize,
) -> Vec<Box<str>> {
    let mut ret = select_features(decomp, blacklist, bio_threshold, fdr_threshold);
    ret.truncate(n_top);
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variance::FeatureVariance;

    fn decomp(rows: &[(&str, f64, f64)]) -> VarianceDecomposition {
        let stats = rows
            .iter()
            .map(|&(_, bio, fdr)| FeatureVariance {
                mean: 1.0,
                total: bio + 1.0,
                tech: 1.0,
                bio,
                p_value: fdr,
                fdr,
            })
            .collect();
        let features = rows.iter().map(|&(f, _, _)| f.into()).collect();
        VarianceDecomposition::new(features, stats, 10).unwrap()
    }

    #[test]
    fn ranks_by_bio_then_id() {
        let d = decomp(&[
            ("c", 1.0, 0.01),
            ("b", 2.0, 0.01),
            ("a", 1.0, 0.01),
            ("low", -0.5, 0.01),
            ("weak", 3.0, 0.5),
            ("nan", f64::NAN, 0.01),
        ]);
        let out = select_features(&d, &Blacklist::new(), 0.0, 0.05);
        let expected: Vec<Box<str>> = vec!["b".into(), "a".into(), "c".into()];
        assert_eq!(out, expected);

        let top = select_top_features(&d, &Blacklist::new(), 0.0, 0.05, 2);
        assert_eq!(top, expected[..2].to_vec());
    }

    #[test]
    fn blacklist_wins_over_everything() {
        let d = decomp(&[("MT-CO1", 100.0, 0.0), ("Rps3", 50.0, 0.0), ("keep", 1.0, 0.0)]);
        let blacklist = Blacklist::from_ids(["MT-CO1"]).with_prefix("RPS");
        let out = select_features(&d, &blacklist, f64::NEG_INFINITY, 1.0);
        assert_eq!(out, vec![Box::<str>::from("keep")]);
    }
}
