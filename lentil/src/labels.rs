use crate::common::*;
use crate::error::invalid_parameter;
use std::collections::HashMap;

/// Categorical labels mapped onto `0 .. K`
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLabels {
    /// `index[j]` in `0 .. names.len()`
    pub index: Vec<usize>,
    /// `names[k]`: the original label of group `k`
    pub names: Vec<Box<str>>,
}

impl DenseLabels {
    pub fn num_groups(&self) -> usize {
        self.names.len()
    }
}

/// Integers sort numerically, everything else lexicographically, and
/// integers come first
fn label_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    }
}

/// Relabel arbitrary categorical labels to dense integers `0 .. K`,
/// ordered by the sorted label values
pub fn densify_labels<T: AsRef<str>>(labels: &[T]) -> DenseLabels {
    let mut names: Vec<Box<str>> = labels.iter().map(|x| Box::from(x.as_ref())).collect();
    names.sort_by(|a, b| label_order(a, b));
    names.dedup();

    let index = {
        let lookup: HashMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(k, x)| (x.as_ref(), k))
            .collect();
        labels.iter().map(|x| lookup[x.as_ref()]).collect()
    };

    DenseLabels { index, names }
}

/// Dense cluster labels for EM: right length, at least 2 clusters
/// * `labels` - one label per cell
/// * `num_cells` - expected length
pub fn cluster_labels_for_em<T: AsRef<str>>(
    labels: &[T],
    num_cells: usize,
) -> anyhow::Result<DenseLabels> {
    if labels.len() != num_cells {
        return Err(invalid_parameter(format!(
            "{} cluster labels for {} cells",
            labels.len(),
            num_cells
        )));
    }
    let dense = densify_labels(labels);
    if dense.num_groups() < 2 {
        return Err(invalid_parameter(format!(
            "need at least 2 distinct cluster labels, found {}",
            dense.num_groups()
        )));
    }
    Ok(dense)
}

/// Names for dense 0-based cluster ids coming out of an initializer:
/// `1, 2, ..., K`
pub fn numbered_names(num_groups: usize) -> Vec<Box<str>> {
    (1..=num_groups)
        .map(|k| k.to_string().into_boxed_str())
        .collect()
}

/// `"{batch}-{label}"`, used to keep labels distinct across batches
pub fn prefix_with_batch(batch: &str, label: &str) -> Box<str> {
    format!("{}-{}", batch, label).into_boxed_str()
}

/// Batch label of every cell, defaulting to a single batch
pub fn batch_labels_or_default(
    batch: Option<&[Box<str>]>,
    num_cells: usize,
) -> anyhow::Result<Vec<Box<str>>> {
    match batch {
        Some(batch) if batch.len() != num_cells => Err(invalid_parameter(format!(
            "{} batch labels for {} cells",
            batch.len(),
            num_cells
        ))),
        Some(batch) => Ok(batch.to_vec()),
        None => Ok(vec![Box::from(DEFAULT_BATCH); num_cells]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_invalid_parameter;

    #[test]
    fn numeric_labels_sort_numerically() {
        let dense = densify_labels(&["10", "2", "b", "2", "a"]);
        let names: Vec<&str> = dense.names.iter().map(|x| x.as_ref()).collect();
        assert_eq!(names, vec!["2", "10", "a", "b"]);
        assert_eq!(dense.index, vec![1, 0, 3, 0, 2]);
        assert_eq!(dense.names[dense.index[4]].as_ref(), "a");
    }

    #[test]
    fn single_cluster_is_rejected() {
        let err = cluster_labels_for_em(&["x", "x", "x"], 3).unwrap_err();
        assert!(is_invalid_parameter(&err));
        let err = cluster_labels_for_em(&["x", "y"], 3).unwrap_err();
        assert!(is_invalid_parameter(&err));
    }

    #[test]
    fn batch_defaults() -> anyhow::Result<()> {
        let batch = batch_labels_or_default(None, 3)?;
        assert!(batch.iter().all(|b| b.as_ref() == DEFAULT_BATCH));
        let given: Vec<Box<str>> = vec!["a".into(), "b".into()];
        assert!(batch_labels_or_default(Some(given.as_slice()), 3).is_err());
        Ok(())
    }
}
