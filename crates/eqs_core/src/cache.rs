//! Query result cache
//!
//! Holds at most one result per query id together with the environment hash
//! it was computed against. A lookup only hits while the caller's current
//! hash still matches; there is no size-based eviction.

use crate::query::QueryResult;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A stored result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: QueryResult,
    pub environment_hash: String,
    pub stored_at: DateTime<Utc>,
}

/// Lookup counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    /// No entry for the query id
    pub misses: u64,
    /// Entry present but computed against another environment
    pub stale_misses: u64,
}

#[derive(Default)]
pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_misses: AtomicU64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `query_id`, only if it was computed against `current_hash`.
    pub fn get(&self, query_id: &str, current_hash: &str) -> Option<QueryResult> {
        match self.entries.get(query_id) {
            Some(entry) if entry.environment_hash == current_hash => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.result.clone())
            }
            Some(entry) => {
                debug!(
                    "Cache entry for '{}' is stale ({} != {})",
                    query_id, entry.environment_hash, current_hash
                );
                self.stale_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `result`, replacing any previous entry for the same query id.
    pub fn put(&self, result: QueryResult, environment_hash: &str) {
        let entry = CacheEntry {
            environment_hash: environment_hash.to_string(),
            stored_at: Utc::now(),
            result,
        };
        self.entries.insert(entry.result.query_id.clone(), entry);
    }

    /// Removes one entry; false when there was none.
    pub fn clear(&self, query_id: &str) -> bool {
        self.entries.remove(query_id).is_some()
    }

    /// Removes everything and returns how many entries were dropped.
    pub fn clear_all(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_misses: self.stale_misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EqsError;

    fn result(id: &str) -> QueryResult {
        QueryResult::failure(id, &EqsError::NoQueryResults("placeholder".into()))
    }

    #[test]
    fn test_hit_only_on_matching_hash() {
        let cache = QueryCache::new();
        cache.put(result("q1"), "hash-a");

        assert!(cache.get("q1", "hash-a").is_some());
        assert!(cache.get("q1", "hash-b").is_none());
        assert!(cache.get("q2", "hash-a").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.stale_misses, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = QueryCache::new();
        cache.put(result("q1"), "hash-a");
        cache.put(result("q1"), "hash-b");
        assert_eq!(cache.len(), 1);
        assert!(cache.get("q1", "hash-a").is_none());
        assert!(cache.get("q1", "hash-b").is_some());
    }

    #[test]
    fn test_clear() {
        let cache = QueryCache::new();
        cache.put(result("q1"), "h");
        cache.put(result("q2"), "h");
        assert!(cache.clear("q1"));
        assert!(!cache.clear("q1"));
        assert_eq!(cache.clear_all(), 1);
        assert!(cache.is_empty());
    }
}
