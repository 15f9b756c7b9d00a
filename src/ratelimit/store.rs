//! Sorted-set stores backing the sliding window.
//!
//! # Responsibilities
//! - Run the expire/count/add/refresh-TTL step as one atomic unit
//! - Roll back a single hit and report the oldest hit in a window
//!
//! # Design Decisions
//! - Redis is the shared store for multi-instance gateways (MULTI/EXEC)
//! - The in-memory store serves single-instance deployments and tests; one
//!   lock makes each call atomic
//! - Expired in-memory keys are dropped by a sweep that runs at most once per
//!   `SWEEP_INTERVAL_SECS`, so abandoned callers do not accumulate

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;

/// Errors from a window store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store did not answer within {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// A remote or local ordered set keyed by hit timestamp.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Atomically remove members scored `<= window_start`, count the rest,
    /// add `member` scored `now` and refresh the key TTL.
    ///
    /// Returns the count taken before `member` was added.
    async fn record_hit(
        &self,
        key: &str,
        member: &str,
        now: i64,
        window_start: i64,
        ttl_secs: u64,
    ) -> Result<u64, StoreError>;

    /// Remove a single member.
    async fn remove_member(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Lowest score in the set, if any.
    async fn oldest_score(&self, key: &str) -> Result<Option<i64>, StoreError>;
}

/// Upper bound on the initial connect, reconnect retries included.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis-backed store sharing one multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!("no connection within {}s", CONNECT_TIMEOUT.as_secs()))
            })??;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl WindowStore for RedisStore {
    async fn record_hit(
        &self,
        key: &str,
        member: &str,
        now: i64,
        window_start: i64,
        ttl_secs: u64,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .zrembyscore(key, "-inf", window_start)
            .ignore()
            .zcard(key)
            .zadd(key, member, now)
            .ignore()
            .expire(key, i64::try_from(ttl_secs).unwrap_or(i64::MAX))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn oldest_score(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let oldest: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        Ok(oldest.first().map(|(_, score)| *score as i64))
    }
}

/// Minimum spacing between sweeps of expired in-memory keys.
pub const SWEEP_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    expires_at: Option<i64>,
}

impl SortedSet {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Debug, Default)]
struct Sets {
    keys: HashMap<String, SortedSet>,
    next_sweep: i64,
}

impl Sets {
    fn sweep(&mut self, now: i64) {
        if now < self.next_sweep {
            return;
        }
        self.keys.retain(|_, set| !set.is_expired(now));
        self.next_sweep = now.saturating_add(SWEEP_INTERVAL_SECS);
    }
}

/// In-process store with the same semantics as the Redis store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: Mutex<Sets>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member directly, e.g. to seed an old hit.
    pub fn insert(&self, key: &str, member: &str, score: i64) {
        self.sets
            .lock()
            .keys
            .entry(key.to_string())
            .or_default()
            .scores
            .insert(member.to_string(), score);
    }

    /// Number of members currently held for `key`.
    pub fn len(&self, key: &str) -> usize {
        self.sets.lock().keys.get(key).map_or(0, |s| s.scores.len())
    }

    /// Number of keys held, expired or not.
    pub fn key_count(&self) -> usize {
        self.sets.lock().keys.len()
    }

    pub fn ttl_deadline(&self, key: &str) -> Option<i64> {
        self.sets.lock().keys.get(key).and_then(|s| s.expires_at)
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn record_hit(
        &self,
        key: &str,
        member: &str,
        now: i64,
        window_start: i64,
        ttl_secs: u64,
    ) -> Result<u64, StoreError> {
        let mut sets = self.sets.lock();
        sets.sweep(now);
        let set = sets.keys.entry(key.to_string()).or_default();

        if set.is_expired(now) {
            set.scores.clear();
        }
        set.scores.retain(|_, score| *score > window_start);
        let count = set.scores.len() as u64;

        set.scores.insert(member.to_string(), now);
        set.expires_at = Some(now.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX)));
        Ok(count)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<(), StoreError> {
        if let Some(set) = self.sets.lock().keys.get_mut(key) {
            set.scores.remove(member);
        }
        Ok(())
    }

    async fn oldest_score(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .sets
            .lock()
            .keys
            .get(key)
            .and_then(|s| s.scores.values().min().copied()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_window() {
        let store = MemoryStore::new();
        store.insert("k", "old", 100);
        store.insert("k", "edge", 140);
        store.insert("k", "fresh", 150);

        // Scores <= window_start are dropped.
        let count = store.record_hit("k", "new", 200, 140, 70).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.len("k"), 2);
        assert_eq!(store.oldest_score("k").await.unwrap(), Some(150));
        assert_eq!(store.ttl_deadline("k"), Some(270));

        store.remove_member("k", "new").await.unwrap();
        assert_eq!(store.len("k"), 1);
    }

    #[tokio::test]
    async fn test_memory_store_expired_key_is_cleared() {
        let store = MemoryStore::new();
        store.record_hit("k", "a", 100, 40, 10).await.unwrap();

        // Past the TTL deadline the whole set is gone, even hits inside the window.
        let count = store.record_hit("k", "b", 111, 51, 10).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_memory_store_drops_abandoned_keys() {
        let store = MemoryStore::new();
        for i in 0..1_000 {
            store.record_hit(&format!("ip-{i}"), "a", 1_000, 940, 70).await.unwrap();
        }
        assert_eq!(store.key_count(), 1_000);

        // Inside the sweep interval nothing is dropped yet.
        store.record_hit("other", "a", 1_030, 970, 70).await.unwrap();
        assert_eq!(store.key_count(), 1_001);

        store.record_hit("other", "b", 4_600, 4_540, 70).await.unwrap();
        assert_eq!(store.key_count(), 1);
        assert_eq!(store.len("other"), 1);
    }

    #[tokio::test]
    async fn test_memory_store_sweep_keeps_live_keys() {
        let store = MemoryStore::new();
        store.record_hit("stale", "a", 1_000, 940, 70).await.unwrap();
        store.record_hit("live", "a", 1_050, 990, 70).await.unwrap();

        store.record_hit("live", "b", 1_080, 1_020, 70).await.unwrap();
        assert_eq!(store.key_count(), 1);
        assert_eq!(store.len("live"), 2);
    }

    #[tokio::test]
    async fn test_memory_store_empty_key() {
        let store = MemoryStore::new();
        assert_eq!(store.oldest_score("missing").await.unwrap(), None);
        store.remove_member("missing", "x").await.unwrap();
        assert_eq!(store.len("missing"), 0);
    }

    /// Connects to `REDIS_URL` when set.
    pub(crate) async fn redis_from_env() -> Option<RedisStore> {
        let Ok(url) = std::env::var("REDIS_URL") else {
            eprintln!("Skipping test: REDIS_URL not set");
            return None;
        };
        Some(RedisStore::connect(&url).await.unwrap())
    }

    pub(crate) fn scratch_key(scope: &str) -> String {
        format!("ratelimit:test:{scope}:{:016x}", fastrand::u64(..))
    }

    #[tokio::test]
    #[ignore = "Requires REDIS_URL environment variable"]
    async fn test_redis_store_window() {
        let Some(store) = redis_from_env().await else {
            return;
        };
        let key = scratch_key("window");

        assert_eq!(store.oldest_score(&key).await.unwrap(), None);
        assert_eq!(store.record_hit(&key, "old", 100, 0, 70).await.unwrap(), 0);
        assert_eq!(store.record_hit(&key, "fresh", 150, 80, 70).await.unwrap(), 1);

        // "old" is scored <= window_start and falls out.
        assert_eq!(store.record_hit(&key, "new", 200, 140, 70).await.unwrap(), 1);
        assert_eq!(store.oldest_score(&key).await.unwrap(), Some(150));

        store.remove_member(&key, "fresh").await.unwrap();
        assert_eq!(store.oldest_score(&key).await.unwrap(), Some(200));
        store.remove_member(&key, "missing").await.unwrap();
    }
}
