use std::sync::Arc;

use crate::model::{CatalogEntry, Code, FetchTask};

/// Full cross product `catalog × subscription_types × terms`, catalog-major.
///
/// No filtering happens here: restrict the catalog to crawl less.
pub fn expand(catalog: &[CatalogEntry], subscription_types: &[Code], terms: &[Code]) -> Vec<FetchTask> {
    let mut tasks = Vec::with_capacity(catalog.len() * subscription_types.len() * terms.len());

    for entry in catalog {
        let entry = Arc::new(entry.clone());
        for subscription in subscription_types {
            for term in terms {
                tasks.push(FetchTask {
                    entry: Arc::clone(&entry),
                    subscription: subscription.clone(),
                    term: term.clone(),
                });
            }
        }
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn catalog(n: usize) -> Vec<CatalogEntry> {
        (0..n)
            .map(|i| CatalogEntry::new(format!("P{i}"), format!("plan {i}"), "5G"))
            .collect()
    }

    fn codes(prefix: &str, n: usize) -> Vec<Code> {
        (0..n)
            .map(|i| Code::new(format!("{prefix}{i}"), format!("{prefix} label {i}")))
            .collect()
    }

    #[test]
    fn size_is_exact_product_of_distinct_tuples() {
        for (c, s, t) in [(1, 1, 1), (4, 3, 2), (7, 3, 1), (2, 5, 3)] {
            let tasks = expand(&catalog(c), &codes("s", s), &codes("t", t));
            assert_eq!(tasks.len(), c * s * t);

            let keys: HashSet<_> = tasks.iter().map(|task| task.key()).collect();
            assert_eq!(keys.len(), tasks.len(), "duplicate task for {c}x{s}x{t}");
        }
    }

    #[test]
    fn any_empty_dimension_yields_nothing() {
        assert!(expand(&[], &codes("s", 3), &codes("t", 2)).is_empty());
        assert!(expand(&catalog(2), &[], &codes("t", 2)).is_empty());
        assert!(expand(&catalog(2), &codes("s", 3), &[]).is_empty());
    }

    #[test]
    fn tasks_share_their_catalog_entry() {
        let tasks = expand(&catalog(1), &codes("s", 3), &codes("t", 2));
        assert!(tasks.iter().all(|t| Arc::ptr_eq(&t.entry, &tasks[0].entry)));
        assert_eq!(tasks[0].key(), ("P0", "s0", "t0"));
        assert_eq!(tasks[1].key(), ("P0", "s0", "t1"));
        assert_eq!(tasks[5].key(), ("P0", "s2", "t1"));
    }
}
