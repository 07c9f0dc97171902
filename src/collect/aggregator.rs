//! Categorized, deduplicated result sets.
//!
//! Workers insert [`ResultItem`]s concurrently; insertion is idempotent per
//! category. After the join barrier the orchestrator calls
//! [`ResultAggregator::resolve`], which applies category precedence so an
//! identifier present in a higher category is dropped from every lower one.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::scheduler::{Category, ResultItem};

/// Concurrent map of category to identifier set.
#[derive(Default)]
pub struct ResultAggregator {
    sets: Mutex<BTreeMap<Category, BTreeSet<String>>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Category, BTreeSet<String>>> {
        self.sets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts one item. Returns `false` if it was already present in its
    /// category.
    pub fn insert(&self, item: ResultItem) -> bool {
        let mut sets = self.lock();
        sets.entry(item.category).or_default().insert(item.id)
    }

    /// Inserts a batch of items under a single lock acquisition. Returns how
    /// many were new.
    pub fn extend(&self, items: impl IntoIterator<Item = ResultItem>) -> usize {
        let mut sets = self.lock();
        let mut added = 0;
        for item in items {
            if sets.entry(item.category).or_default().insert(item.id) {
                added += 1;
            }
        }
        added
    }

    /// Number of identifiers held under `category`, before precedence is
    /// applied.
    pub fn count(&self, category: Category) -> usize {
        self.lock().get(&category).map_or(0, BTreeSet::len)
    }

    /// Snapshot with category precedence applied.
    pub fn resolve(&self) -> ResolvedResults {
        let sets = self.lock();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut categories = Vec::new();

        for category in Category::ALL {
            let mut ids = Vec::new();
            if let Some(set) = sets.get(&category) {
                for id in set {
                    if seen.insert(id.as_str()) {
                        ids.push(id.clone());
                    }
                }
            }
            categories.push((category, ids));
        }

        ResolvedResults { categories }
    }
}

/// Final result sets: categories in precedence order, identifiers sorted
/// within a category, and no identifier listed twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedResults {
    categories: Vec<(Category, Vec<String>)>,
}

impl ResolvedResults {
    /// Identifiers resolved into `category`.
    pub fn get(&self, category: Category) -> &[String] {
        self.categories
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, ids)| ids.as_slice())
            .unwrap_or(&[])
    }

    /// Every `(identifier, category)` pair in output order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Category)> + '_ {
        self.categories
            .iter()
            .flat_map(|(category, ids)| ids.iter().map(move |id| (id.as_str(), *category)))
    }

    /// Category an identifier was resolved into, if any.
    pub fn category_of(&self, id: &str) -> Option<Category> {
        self.entries().find(|(i, _)| *i == id).map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|(_, ids)| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_is_idempotent() {
        let aggregator = ResultAggregator::new();
        assert!(aggregator.insert(ResultItem::new("w1", Category::Secondary)));
        assert!(!aggregator.insert(ResultItem::new("w1", Category::Secondary)));
        assert_eq!(aggregator.count(Category::Secondary), 1);
        assert_eq!(aggregator.count(Category::Priority), 0);
    }

    #[test]
    fn test_extend_counts_new_items() {
        let aggregator = ResultAggregator::new();
        let added = aggregator.extend(vec![
            ResultItem::new("a", Category::Priority),
            ResultItem::new("a", Category::Priority),
            ResultItem::new("a", Category::Secondary),
        ]);
        assert_eq!(added, 2);
    }

    #[test]
    fn test_priority_wins_on_resolve() {
        let aggregator = ResultAggregator::new();
        aggregator.insert(ResultItem::new("shared", Category::Secondary));
        aggregator.insert(ResultItem::new("shared", Category::Priority));
        aggregator.insert(ResultItem::new("local", Category::Secondary));

        let resolved = aggregator.resolve();
        assert_eq!(resolved.get(Category::Priority), ["shared".to_string()]);
        assert_eq!(resolved.get(Category::Secondary), ["local".to_string()]);
        assert_eq!(resolved.category_of("shared"), Some(Category::Priority));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_resolve_orders_categories_then_ids() {
        let aggregator = ResultAggregator::new();
        for id in ["z", "b", "m"] {
            aggregator.insert(ResultItem::new(id, Category::Secondary));
        }
        aggregator.insert(ResultItem::new("y", Category::Priority));

        let resolved = aggregator.resolve();
        let entries: Vec<_> = resolved
            .entries()
            .map(|(id, c)| (id.to_string(), c))
            .collect();
        assert_eq!(
            entries,
            vec![
                ("y".to_string(), Category::Priority),
                ("b".to_string(), Category::Secondary),
                ("m".to_string(), Category::Secondary),
                ("z".to_string(), Category::Secondary),
            ]
        );
    }

    #[test]
    fn test_resolve_empty() {
        let resolved = ResultAggregator::new().resolve();
        assert!(resolved.is_empty());
        assert!(resolved.get(Category::Priority).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_deduplicate() {
        let aggregator = Arc::new(ResultAggregator::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let aggregator = Arc::clone(&aggregator);
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    aggregator.insert(ResultItem::new(format!("w{i}"), Category::Secondary));
                }
            }));
        }
        for handle in handles {
            handle.await.expect("task should not panic");
        }

        assert_eq!(aggregator.count(Category::Secondary), 50);
    }
}
