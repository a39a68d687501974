//! Optimistic read-modify-write over a single integer counter.
//!
//! Every mutation of a counter goes through [`update_counter`]: read the value
//! together with its revision, decide the new value, then write it back only if
//! the key is still at that revision. A lost race is retried from the read;
//! business rejections from the decision closure are returned immediately.

use std::time::Duration;

use kv_store::{KvStore, SetOptions, Version};

use crate::error::DomainError;

/// Bounds the optimistic retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of read/commit attempts (at least 1).
    pub max_attempts: u32,
    /// Delay after the first conflict; doubles after every further conflict.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the default backoff and the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Retries immediately, without sleeping between attempts.
    pub fn without_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Returns how long to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 64,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(50),
        }
    }
}

/// Parses a stored counter value.
pub(crate) fn parse_counter(key: &str, raw: &str) -> Result<i64, DomainError> {
    raw.parse().map_err(|e: std::num::ParseIntError| DomainError::CorruptValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Applies `decide` to the counter at `key` and commits the result atomically.
///
/// `decide` receives the current value (None if the key was never written) and
/// returns the value to store, or an error to abort without writing. It may run
/// several times when other writers commit in between. Returns the committed value.
pub async fn update_counter<S, F>(
    store: &S,
    key: &str,
    policy: &RetryPolicy,
    decide: F,
) -> Result<i64, DomainError>
where
    S: KvStore + ?Sized,
    F: FnMut(Option<i64>) -> Result<i64, DomainError>,
{
    let (value, _) = commit_counter(store, key, policy, decide).await?;
    Ok(value)
}

/// Like [`update_counter`], also returning the revision the value was committed at.
pub(crate) async fn commit_counter<S, F>(
    store: &S,
    key: &str,
    policy: &RetryPolicy,
    mut decide: F,
) -> Result<(i64, Version), DomainError>
where
    S: KvStore + ?Sized,
    F: FnMut(Option<i64>) -> Result<i64, DomainError>,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        // The revision read here is the fence the conditional write checks against.
        let (current, version) = match store.get(key).await? {
            Some(entry) => (Some(parse_counter(key, &entry.value)?), entry.version),
            None => (None, Version::initial()),
        };

        let next = decide(current)?;

        match store
            .set(key, next.to_string(), SetOptions::expect_version(version))
            .await
        {
            Ok(committed) => return Ok((next, committed)),
            Err(e) if e.is_conflict() => {
                metrics::counter!("kv_cas_conflicts_total").increment(1);
                tracing::debug!(key, attempt, "optimistic write lost a race, retrying");
                if attempt < attempts {
                    let delay = policy.delay_for(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    metrics::counter!("kv_cas_exhausted_total").increment(1);
    tracing::warn!(key, attempts, "optimistic write retry budget exhausted");
    Err(DomainError::ContentionExhausted {
        key: key.to_string(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflicting::AlwaysConflicting;
    use kv_store::InMemoryKvStore;

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(10),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(2));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8));
        assert_eq!(policy.delay_for(4), Duration::from_millis(10));
        assert_eq!(policy.delay_for(40), Duration::from_millis(10));
    }

    #[test]
    fn new_policy_has_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn absent_key_is_passed_as_none() {
        let store = InMemoryKvStore::new();
        let policy = RetryPolicy::default();

        let value = update_counter(&store, "c", &policy, |current| {
            assert_eq!(current, None);
            Ok(5)
        })
        .await
        .unwrap();

        assert_eq!(value, 5);
        assert_eq!(store.get("c").await.unwrap().unwrap().value, "5");
    }

    #[tokio::test]
    async fn decision_error_aborts_without_writing() {
        let store = InMemoryKvStore::new();
        let policy = RetryPolicy::default();

        let result = update_counter(&store, "c", &policy, |_| {
            Err(DomainError::InvalidQuantity(0))
        })
        .await;

        assert!(matches!(result, Err(DomainError::InvalidQuantity(0))));
        assert!(store.get("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_counter_is_reported() {
        let store = InMemoryKvStore::new();
        store
            .set("c", "many".to_string(), SetOptions::new())
            .await
            .unwrap();

        let result = update_counter(&store, "c", &RetryPolicy::default(), |c| Ok(c.unwrap_or(0))).await;
        assert!(matches!(result, Err(DomainError::CorruptValue { .. })));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let store = AlwaysConflicting::default();
        let policy = RetryPolicy::without_backoff(3);

        let result = update_counter(&store, "c", &policy, |_| Ok(1)).await;

        match result {
            Err(DomainError::ContentionExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(store.attempts(), 3);
    }

    /// A store whose conditional writes always lose the race.
    mod conflicting {
        use std::sync::atomic::{AtomicU32, Ordering};

        use kv_store::{Entry, KvStore, KvStoreError, Result, SetOptions, Version};

        #[derive(Default)]
        pub struct AlwaysConflicting {
            attempts: AtomicU32,
        }

        impl AlwaysConflicting {
            pub fn attempts(&self) -> u32 {
                self.attempts.load(Ordering::SeqCst)
            }
        }

        #[async_trait::async_trait]
        impl KvStore for AlwaysConflicting {
            async fn get(&self, _key: &str) -> Result<Option<Entry>> {
                Ok(None)
            }

            async fn set(&self, key: &str, _value: String, _options: SetOptions) -> Result<Version> {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                Err(KvStoreError::ConcurrencyConflict {
                    key: key.to_string(),
                    expected: Version::initial(),
                    actual: Version::first(),
                })
            }

            async fn delete(&self, _key: &str) -> Result<bool> {
                Ok(false)
            }

            async fn delete_at(&self, _key: &str, _expected: Version) -> Result<bool> {
                Ok(false)
            }

            async fn set_add(&self, _key: &str, _member: &str) -> Result<bool> {
                Ok(false)
            }

            async fn set_remove(&self, _key: &str, _members: &[String]) -> Result<usize> {
                Ok(0)
            }

            async fn set_members(&self, _key: &str) -> Result<Vec<String>> {
                Ok(vec![])
            }

            async fn sorted_add(&self, _key: &str, _score: i64, _member: &str) -> Result<()> {
                Ok(())
            }

            async fn sorted_remove(&self, _key: &str, _member: &str) -> Result<bool> {
                Ok(false)
            }

            async fn sorted_range_desc(
                &self,
                _key: &str,
                _max: Option<i64>,
                _limit: usize,
            ) -> Result<Vec<(String, i64)>> {
                Ok(vec![])
            }

            async fn ping(&self) -> Result<()> {
                Ok(())
            }
        }
    }
}
