use crate::common::*;
use matrix_util::common_io::read_lines_of_words;

/// How early a batch should join the reference
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPriority {
    /// lower goes first
    pub rank: i64,
    /// among equal ranks, larger goes first
    pub size: usize,
}

/// The sequence in which batches are merged into the reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOrder {
    batches: Vec<Box<str>>,
}

impl MergeOrder {
    /// Take an order as given; nothing is checked until
    /// [`MergeOrder::validate_against`]
    pub fn new<I, S>(batches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        Self {
            batches: batches.into_iter().map(Into::into).collect(),
        }
    }

    pub fn batches(&self) -> &[Box<str>] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Box<str>> {
        self.batches.iter()
    }

    /// The order must name every batch exactly once and nothing else
    pub fn validate_against<'a, I>(&self, batches: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Box<str>>,
    {
        let expected: BTreeSet<&str> = batches.into_iter().map(|x| x.as_ref()).collect();

        let mut seen = BTreeSet::new();
        let mut duplicated = BTreeSet::new();
        let mut unknown = BTreeSet::new();
        for b in self.batches.iter() {
            if !seen.insert(b.as_ref()) {
                duplicated.insert(b.clone());
            }
            if !expected.contains(b.as_ref()) {
                unknown.insert(b.clone());
            }
        }

        let missing: Vec<Box<str>> = expected
            .iter()
            .filter(|b| !seen.contains(*b))
            .map(|&b| b.into())
            .collect();

        if missing.is_empty() && duplicated.is_empty() && unknown.is_empty() {
            Ok(())
        } else {
            Err(IntegrationError::OrderMismatch {
                missing,
                duplicated: duplicated.into_iter().collect(),
                unknown: unknown.into_iter().collect(),
            })
        }
    }
}

impl std::fmt::Display for MergeOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.batches.iter().map(|x| x.as_ref()).collect();
        write!(f, "{}", names.join(" -> "))
    }
}

/// Order batches by `rank` (ascending), then `size` (descending), then
/// id; the `query` batch, if any, goes last
pub fn compute_merge_order(
    priority: &BatchMap<BatchPriority>,
    query: Option<&str>,
) -> Result<MergeOrder> {
    if let Some(q) = query {
        if priority.contains_key(q) {
            return Err(IntegrationError::InvalidPriority {
                batch: q.into(),
                reason: "the query batch cannot also be a reference".into(),
            });
        }
        if q.is_empty() {
            return Err(IntegrationError::InvalidPriority {
                batch: q.into(),
                reason: "empty query name".into(),
            });
        }
    }

    let mut ranked: Vec<(&Box<str>, &BatchPriority)> = priority.iter().collect();
    ranked.sort_by(|a, b| {
        a.1.rank
            .cmp(&b.1.rank)
            .then(b.1.size.cmp(&a.1.size))
            .then_with(|| a.0.cmp(b.0))
    });

    let mut batches: Vec<Box<str>> = ranked.into_iter().map(|(b, _)| b.clone()).collect();
    if let Some(q) = query {
        batches.push(q.into());
    }

    if batches.is_empty() {
        return Err(IntegrationError::NoDatasets);
    }

    let ret = MergeOrder { batches };
    info!("merge order: {}", ret);
    Ok(ret)
}

/// Read `batch rank size` lines, tab or space separated
///
/// ```text
/// # batch  rank  size
/// lung_a   1     5000
/// lung_b   1     8000
/// blood    2     3000
/// ```
pub fn read_priority_table(file: &str) -> anyhow::Result<BatchMap<BatchPriority>> {
    let lines = read_lines_of_words(file, None, false)?.lines;
    let mut ret = BatchMap::new();
    for (i, words) in lines.iter().enumerate() {
        if words.len() != 3 {
            anyhow::bail!(
                "{}: line {} should be `batch rank size`, found {} fields",
                file,
                i + 1,
                words.len()
            );
        }
        let batch = words[0].clone();
        let rank = words[1].parse::<i64>().map_err(|e| {
            IntegrationError::InvalidPriority {
                batch: batch.clone(),
                reason: format!("rank '{}': {}", words[1], e),
            }
        })?;
        let size = words[2].parse::<usize>().map_err(|e| {
            IntegrationError::InvalidPriority {
                batch: batch.clone(),
                reason: format!("size '{}': {}", words[2], e),
            }
        })?;
        if ret.insert(batch.clone(), BatchPriority { rank, size }).is_some() {
            return Err(IntegrationError::InvalidPriority {
                batch,
                reason: "listed more than once".into(),
            }
            .into());
        }
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priority(rows: &[(&str, i64, usize)]) -> BatchMap<BatchPriority> {
        rows.iter()
            .map(|&(b, rank, size)| (b.into(), BatchPriority { rank, size }))
            .collect()
    }

    #[test]
    fn rank_then_size_then_id() -> anyhow::Result<()> {
        let p = priority(&[("c", 2, 10), ("a", 1, 50), ("b", 1, 80), ("d", 1, 80)]);
        let order = compute_merge_order(&p, Some("q"))?;
        assert_eq!(
            order.batches(),
            &["b".into(), "d".into(), "a".into(), "c".into(), "q".into()] as &[Box<str>]
        );
        Ok(())
    }

    #[test]
    fn query_cannot_be_a_reference() {
        let p = priority(&[("a", 1, 1)]);
        assert!(matches!(
            compute_merge_order(&p, Some("a")),
            Err(IntegrationError::InvalidPriority { .. })
        ));
    }

    #[test]
    fn validation_reports_every_problem() {
        let batches: Vec<Box<str>> = vec!["a".into(), "b".into(), "c".into()];
        let order = MergeOrder::new(["a", "a", "x"]);
        match order.validate_against(batches.iter()) {
            Err(IntegrationError::OrderMismatch {
                missing,
                duplicated,
                unknown,
            }) => {
                assert_eq!(missing, vec![Box::<str>::from("b"), "c".into()]);
                assert_eq!(duplicated, vec![Box::<str>::from("a")]);
                assert_eq!(unknown, vec![Box::<str>::from("x")]);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(MergeOrder::new(["c", "a", "b"]).validate_against(batches.iter()).is_ok());
    }
}
