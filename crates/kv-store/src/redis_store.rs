use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use crate::{
    Entry, KvStoreError, Result, Version,
    store::{KvStore, SetOptions},
};

/// Atomic check-and-set over a `{value, version}` hash.
///
/// ARGV[1] is the expected version (-1 for an unconditional write) and
/// ARGV[2] the new value. Returns `{committed, version}` where `version` is
/// the new revision on success and the current one on conflict.
const CHECK_AND_SET: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], 'version') or '0')
local expected = tonumber(ARGV[1])
if expected >= 0 and current ~= expected then
  return {0, current}
end
local next_version = current + 1
redis.call('HSET', KEYS[1], 'value', ARGV[2], 'version', next_version)
return {1, next_version}
"#;

/// Deletes a `{value, version}` hash only if it is at ARGV[1].
///
/// Returns `{-1, current}` on conflict, otherwise `{deleted, current}`.
const CHECK_AND_DELETE: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], 'version') or '0')
if current ~= tonumber(ARGV[1]) then
  return {-1, current}
end
return {redis.call('DEL', KEYS[1]), current}
"#;

/// Redis-backed key-value store.
///
/// Plain values live in hashes holding the payload and its revision, so the
/// conditional write can run as one server-side script: Redis executes
/// scripts atomically, which gives the same guarantee as a WATCH/MULTI/EXEC
/// transaction without pinning a connection.
///
/// Sorted-set scores are doubles on the server; scores above 2^53 lose precision.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
    check_and_set: Script,
    check_and_delete: Script,
}

impl RedisKvStore {
    /// Connects to Redis at a `redis://` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            check_and_set: Script::new(CHECK_AND_SET),
            check_and_delete: Script::new(CHECK_AND_DELETE),
        })
    }

    /// Connects to Redis at a bare `host:port` address.
    pub async fn connect_host(host: &str) -> Result<Self> {
        if host.starts_with("redis://") || host.starts_with("rediss://") {
            Self::connect(host).await
        } else {
            Self::connect(&format!("redis://{host}")).await
        }
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        let mut conn = self.conn.clone();
        let (value, version): (Option<String>, Option<i64>) = redis::cmd("HMGET")
            .arg(key)
            .arg("value")
            .arg("version")
            .query_async(&mut conn)
            .await?;

        match (value, version) {
            (Some(value), Some(version)) => Ok(Some(Entry {
                value,
                version: Version::new(version),
            })),
            (None, None) => Ok(None),
            _ => Err(KvStoreError::Corrupt {
                key: key.to_string(),
                reason: "hash is missing its value or version field".to_string(),
            }),
        }
    }

    async fn set(&self, key: &str, value: String, options: SetOptions) -> Result<Version> {
        let mut conn = self.conn.clone();
        let expected = options.expected_version.map(|v| v.as_i64()).unwrap_or(-1);

        let (committed, version): (i64, i64) = self
            .check_and_set
            .key(key)
            .arg(expected)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;

        if committed == 0 {
            tracing::debug!(key, expected, actual = version, "conditional set rejected");
            return Err(KvStoreError::ConcurrencyConflict {
                key: key.to_string(),
                expected: Version::new(expected),
                actual: Version::new(version),
            });
        }

        Ok(Version::new(version))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn delete_at(&self, key: &str, expected: Version) -> Result<bool> {
        let mut conn = self.conn.clone();
        let (deleted, current): (i64, i64) = self
            .check_and_delete
            .key(key)
            .arg(expected.as_i64())
            .invoke_async(&mut conn)
            .await?;

        if deleted < 0 {
            tracing::debug!(key, %expected, actual = current, "conditional delete rejected");
            return Err(KvStoreError::ConcurrencyConflict {
                key: key.to_string(),
                expected,
                actual: Version::new(current),
            });
        }
        Ok(deleted > 0)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<usize> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let removed: usize = redis::cmd("SREM")
            .arg(key)
            .arg(members)
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn sorted_add(&self, key: &str, score: i64, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn sorted_range_desc(
        &self,
        key: &str,
        max: Option<i64>,
        limit: usize,
    ) -> Result<Vec<(String, i64)>> {
        let max = match max {
            Some(score) => score.to_string(),
            None => "+inf".to_string(),
        };

        let mut conn = self.conn.clone();
        let members: Vec<(String, f64)> = redis::cmd("ZREVRANGEBYSCORE")
            .arg(key)
            .arg(max)
            .arg("-inf")
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        Ok(members
            .into_iter()
            .map(|(member, score)| (member, score as i64))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
