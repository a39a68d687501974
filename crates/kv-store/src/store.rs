use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Result, Version};

/// A stored value together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: String,
    pub version: Version,
}

/// Options for writing a value to the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Revision the key must still be at for the write to commit.
    /// If None, the write is unconditional.
    pub expected_version: Option<Version>,
}

impl SetOptions {
    /// Creates options for an unconditional write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the key to be at a specific revision.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the key to be absent.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// Core trait for key-value store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Handles are cheap
/// to clone and share one underlying connection pool or map.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads a value and the revision it is currently at.
    ///
    /// Returns None if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<Entry>>;

    /// Writes a value, returning the key's new revision.
    ///
    /// If `options.expected_version` is set, the check and the write happen
    /// atomically and the operation fails with `ConcurrencyConflict` when the
    /// key is no longer at that revision. Nothing is written in that case.
    async fn set(&self, key: &str, value: String, options: SetOptions) -> Result<Version>;

    /// Deletes a key. Returns true if the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Deletes a key only if it is still at `expected`.
    ///
    /// Fails with `ConcurrencyConflict` when another write moved the key on.
    async fn delete_at(&self, key: &str, expected: Version) -> Result<bool>;

    /// Adds a member to the set at `key`. Returns true if it was not present yet.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Removes members from the set at `key`. Returns how many were removed.
    async fn set_remove(&self, key: &str, members: &[String]) -> Result<usize>;

    /// Lists the members of the set at `key`.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Adds (or re-scores) a member of the sorted set at `key`.
    async fn sorted_add(&self, key: &str, score: i64, member: &str) -> Result<()>;

    /// Removes a member from the sorted set at `key`. Returns true if it was present.
    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// Lists up to `limit` members of the sorted set at `key`, highest score first.
    ///
    /// When `max` is given only members scoring at most `max` are returned.
    /// Members with equal scores come in reverse lexicographic order.
    async fn sorted_range_desc(
        &self,
        key: &str,
        max: Option<i64>,
        limit: usize,
    ) -> Result<Vec<(String, i64)>>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Extension trait providing JSON helpers for stores.
#[async_trait]
pub trait KvStoreExt: KvStore {
    /// Reads and deserializes a JSON value.
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(entry) => Ok(Some(serde_json::from_str(&entry.value)?)),
            None => Ok(None),
        }
    }

    /// Serializes and writes a JSON value.
    async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<Version> {
        let encoded = serde_json::to_string(value)?;
        self.set(key, encoded, options).await
    }
}

// Blanket implementation for all KvStore implementations
impl<T: KvStore + ?Sized> KvStoreExt for T {}
