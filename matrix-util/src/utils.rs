use fnv::FnvHasher;
use std::collections::BTreeMap;
use std::hash::Hasher;

/// partition membership vector into groups of indexes
/// # Arguments
/// * `membership` - a vector of membership (E.g., batch or cluster label)
/// # Returns
/// An ordered map: group name -> indexes of the elements, where the
/// indexes within each group keep their original order
pub fn partition_by_membership<T>(membership: &[T]) -> BTreeMap<T, Vec<usize>>
where
    T: Ord + Clone,
{
    let mut groups: BTreeMap<T, Vec<usize>> = BTreeMap::new();
    for (elem, k) in membership.iter().enumerate() {
        groups.entry(k.clone()).or_default().push(elem);
    }
    groups
}

/// Derive a child seed from a parent seed and a string key.
///
/// FNV-1a is stable across platforms and runs, so the same `(seed,
/// key)` always gives the same child seed.
pub fn derive_seed(seed: u64, key: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write_u64(seed);
    hasher.write(key.as_bytes());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_keeps_order() {
        let membership = vec!["b", "a", "b", "a", "c"];
        let groups = partition_by_membership(&membership);
        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(groups["a"], vec![1, 3]);
        assert_eq!(groups["b"], vec![0, 2]);
    }

    #[test]
    fn derived_seeds_are_stable_and_distinct() {
        assert_eq!(derive_seed(12345, "b1"), derive_seed(12345, "b1"));
        assert_ne!(derive_seed(12345, "b1"), derive_seed(12345, "b2"));
        assert_ne!(derive_seed(1, "b1"), derive_seed(2, "b1"));
    }
}
