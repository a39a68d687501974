use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    Entry, KvStoreError, Result, Version,
    store::{KvStore, SetOptions},
};

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, Entry>,
    // Vec keeps insertion order, which makes iteration order deterministic in tests.
    sets: HashMap<String, Vec<String>>,
    sorted: HashMap<String, Vec<(String, i64)>>,
}

/// In-memory key-value store for tests and single-process deployments.
///
/// Provides the same interface and the same compare-and-swap guarantees as
/// the Redis implementation: the revision check and the write happen under
/// one write lock.
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryKvStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        Ok(self.state.read().await.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String, options: SetOptions) -> Result<Version> {
        let mut state = self.state.write().await;

        let current_version = state
            .values
            .get(key)
            .map(|entry| entry.version)
            .unwrap_or(Version::initial());

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(KvStoreError::ConcurrencyConflict {
                key: key.to_string(),
                expected,
                actual: current_version,
            });
        }

        let version = current_version.next();
        state
            .values
            .insert(key.to_string(), Entry { value, version });

        Ok(version)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let removed_value = state.values.remove(key).is_some();
        let removed_set = state.sets.remove(key).is_some();
        let removed_sorted = state.sorted.remove(key).is_some();
        Ok(removed_value || removed_set || removed_sorted)
    }

    async fn delete_at(&self, key: &str, expected: Version) -> Result<bool> {
        let mut state = self.state.write().await;
        let current = state
            .values
            .get(key)
            .map(|entry| entry.version)
            .unwrap_or(Version::initial());
        if current != expected {
            return Err(KvStoreError::ConcurrencyConflict {
                key: key.to_string(),
                expected,
                actual: current,
            });
        }
        Ok(state.values.remove(key).is_some())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let members = state.sets.entry(key.to_string()).or_default();
        if members.iter().any(|m| m == member) {
            return Ok(false);
        }
        members.push(member.to_string());
        Ok(true)
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<usize> {
        let mut state = self.state.write().await;
        let Some(existing) = state.sets.get_mut(key) else {
            return Ok(0);
        };

        let before = existing.len();
        existing.retain(|m| !members.contains(m));
        let removed = before - existing.len();

        // Redis drops empty sets, so do we.
        if existing.is_empty() {
            state.sets.remove(key);
        }
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(state.sets.get(key).cloned().unwrap_or_default())
    }

    async fn sorted_add(&self, key: &str, score: i64, member: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let members = state.sorted.entry(key.to_string()).or_default();
        match members.iter_mut().find(|(m, _)| m == member) {
            Some(existing) => existing.1 = score,
            None => members.push((member.to_string(), score)),
        }
        Ok(())
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(members) = state.sorted.get_mut(key) else {
            return Ok(false);
        };

        let before = members.len();
        members.retain(|(m, _)| m != member);
        let removed = members.len() < before;

        if members.is_empty() {
            state.sorted.remove(key);
        }
        Ok(removed)
    }

    async fn sorted_range_desc(
        &self,
        key: &str,
        max: Option<i64>,
        limit: usize,
    ) -> Result<Vec<(String, i64)>> {
        let state = self.state.read().await;
        let mut members: Vec<_> = state
            .sorted
            .get(key)
            .map(|members| {
                members
                    .iter()
                    .filter(|(_, score)| max.is_none_or(|m| *score <= m))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Highest score first; ties broken like Redis (reverse lexicographic).
        members.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        members.truncate(limit);
        Ok(members)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
