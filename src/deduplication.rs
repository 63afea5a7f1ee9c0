// 🔍 Deduplication - key uniqueness for entity-months and indicator months
//
// Keys are exact (ticker + month key, or month key alone), so detection is a
// single hash pass instead of pairwise comparison.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

// ============================================================================
// FIRST-SEEN FILTER
// ============================================================================

/// Keeps the first occurrence of every key
#[derive(Debug)]
pub struct KeyDeduplicator<K> {
    seen: HashSet<K>,
}

impl<K: Hash + Eq> KeyDeduplicator<K> {
    pub fn new() -> Self {
        KeyDeduplicator {
            seen: HashSet::new(),
        }
    }

    /// True the first time a key is offered, false afterwards
    pub fn first_seen(&mut self, key: K) -> bool {
        self.seen.insert(key)
    }

    pub fn unique_count(&self) -> usize {
        self.seen.len()
    }
}

impl<K: Hash + Eq> Default for KeyDeduplicator<K> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// DUPLICATE DETECTION
// ============================================================================

/// A key that occurs more than once, with every row index holding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateKey<K> {
    pub key: K,
    pub indices: Vec<usize>,
}

impl<K> DuplicateKey<K> {
    /// Rows beyond the first
    pub fn extra_rows(&self) -> usize {
        self.indices.len().saturating_sub(1)
    }
}

/// Every key occurring more than once, ordered by first occurrence
pub fn find_duplicates<K, I>(keys: I) -> Vec<DuplicateKey<K>>
where
    K: Hash + Eq + Clone,
    I: IntoIterator<Item = K>,
{
    let mut positions: HashMap<K, Vec<usize>> = HashMap::new();
    let mut order = Vec::new();

    for (idx, key) in keys.into_iter().enumerate() {
        let entry = positions.entry(key.clone()).or_default();
        if entry.is_empty() {
            order.push(key);
        }
        entry.push(idx);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let indices = positions.remove(&key)?;
            (indices.len() > 1).then_some(DuplicateKey { key, indices })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
