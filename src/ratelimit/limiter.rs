//! Sliding-window rate limiter.
//!
//! Each hit is stored as a sorted-set member scored by its epoch second.
//! A check drops entries older than the window, counts what remains and
//! records the new hit in one atomic store call. Rejected hits are rolled
//! back so a blocked client does not extend its own penalty.
//!
//! Store failures never block traffic: the check is treated as allowed and
//! carries no quota information. A store that stops answering counts as a
//! failure once `store_timeout_ms` elapses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use super::store::{MemoryStore, RedisStore, StoreError, WindowStore};
use crate::config::{QuotaConfig, RateLimitBackend, RateLimitConfig};
use crate::observability::metrics;

/// Extra TTL on window keys so a key outlives its newest hit.
pub const EXPIRY_BUFFER_SECS: u64 = 10;

const DEFAULT_IDENTIFIER: &str = "req";

/// Quota state reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds at which the window frees up.
    pub reset_at: i64,
    pub current_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// `None` when the limiter is disabled or the store failed.
    pub quota: Option<QuotaSnapshot>,
}

impl RateLimitDecision {
    pub fn unmetered() -> Self {
        Self {
            allowed: true,
            quota: None,
        }
    }

    /// Seconds until the window frees up, at least one.
    pub fn retry_after_at(&self, now: i64) -> Option<u64> {
        self.quota
            .map(|q| u64::try_from(q.reset_at.saturating_sub(now)).unwrap_or(0).max(1))
    }
}

pub struct RateLimiter {
    enabled: bool,
    store: Option<Arc<dyn WindowStore>>,
    global: QuotaConfig,
    per_user: QuotaConfig,
    store_timeout: Duration,
    nonce: u64,
    sequence: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, store: Option<Arc<dyn WindowStore>>) -> Self {
        Self {
            enabled: config.enabled,
            store,
            global: config.global,
            per_user: config.per_user,
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            nonce: fastrand::u64(..),
            sequence: AtomicU64::new(0),
        }
    }

    /// A limiter that allows everything.
    pub fn disabled() -> Self {
        Self::new(
            &RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
            None,
        )
    }

    /// Build the limiter for `config`, connecting to Redis when selected.
    ///
    /// An unreachable Redis is logged and the limiter runs without a store,
    /// admitting every request.
    pub async fn connect(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            info!("Rate limiting disabled");
            return Self::new(config, None);
        }

        let store: Option<Arc<dyn WindowStore>> = match config.backend {
            RateLimitBackend::Memory => {
                info!("Rate limiter using in-memory store");
                Some(Arc::new(MemoryStore::new()))
            }
            RateLimitBackend::Redis => match RedisStore::connect(&config.redis_url).await {
                Ok(store) => {
                    info!(url = %config.redis_url, "Rate limiter connected to Redis");
                    Some(Arc::new(store))
                }
                Err(e) => {
                    error!(
                        url = %config.redis_url,
                        error = %e,
                        "Redis unreachable, rate limiting will fail open"
                    );
                    None
                }
            },
        };
        Self::new(config, store)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True when a store is attached.
    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    pub fn global_quota(&self) -> QuotaConfig {
        self.global
    }

    pub fn per_user_quota(&self) -> QuotaConfig {
        self.per_user
    }

    pub async fn check_global(&self, client_ip: &str) -> RateLimitDecision {
        let key = format!("ratelimit:global:{client_ip}");
        self.check_and_record(&key, self.global.requests, self.global.window_secs, Some(client_ip))
            .await
    }

    pub async fn check_user(&self, user_id: &str) -> RateLimitDecision {
        let key = format!("ratelimit:user:{user_id}");
        self.check_and_record(&key, self.per_user.requests, self.per_user.window_secs, Some(user_id))
            .await
    }

    pub async fn check_and_record(
        &self,
        key: &str,
        limit: u64,
        window_secs: u64,
        identifier: Option<&str>,
    ) -> RateLimitDecision {
        self.check_and_record_at(key, limit, window_secs, identifier, Utc::now().timestamp())
            .await
    }

    pub async fn check_and_record_at(
        &self,
        key: &str,
        limit: u64,
        window_secs: u64,
        identifier: Option<&str>,
        now: i64,
    ) -> RateLimitDecision {
        if !self.enabled {
            return RateLimitDecision::unmetered();
        }
        let Some(store) = self.store.as_deref() else {
            return RateLimitDecision::unmetered();
        };

        let check = self.evaluate(store, key, limit, window_secs, identifier, now);
        let outcome = match tokio::time::timeout(self.store_timeout, check).await {
            Ok(outcome) => outcome,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        };

        match outcome {
            Ok(decision) => decision,
            Err(e) => {
                error!(key = %key, error = %e, "Rate limit check failed, allowing request");
                metrics::record_rate_limiter_error();
                RateLimitDecision::unmetered()
            }
        }
    }

    async fn evaluate(
        &self,
        store: &dyn WindowStore,
        key: &str,
        limit: u64,
        window_secs: u64,
        identifier: Option<&str>,
        now: i64,
    ) -> Result<RateLimitDecision, StoreError> {
        let window = i64::try_from(window_secs).unwrap_or(i64::MAX);
        let window_start = now.saturating_sub(window);
        let member = self.member(now, identifier.unwrap_or(DEFAULT_IDENTIFIER));

        let count = store
            .record_hit(key, &member, now, window_start, window_secs.saturating_add(EXPIRY_BUFFER_SECS))
            .await?;

        if count >= limit {
            store.remove_member(key, &member).await?;
            let reset_at = store
                .oldest_score(key)
                .await?
                .map_or(now.saturating_add(window), |oldest| oldest.saturating_add(window));
            return Ok(RateLimitDecision {
                allowed: false,
                quota: Some(QuotaSnapshot {
                    limit,
                    remaining: 0,
                    reset_at,
                    current_count: count,
                }),
            });
        }

        Ok(RateLimitDecision {
            allowed: true,
            quota: Some(QuotaSnapshot {
                limit,
                remaining: limit - count - 1,
                reset_at: now.saturating_add(window),
                current_count: count + 1,
            }),
        })
    }

    // Same-second hits from one identifier must stay distinct members,
    // across replicas sharing a store too.
    fn member(&self, now: i64, identifier: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{now}:{identifier}:{:016x}-{seq}", self.nonce)
    }
}
