//! TTL-bounded cache over the KV substrate.
//!
//! Every key is written as `cache_{scope}`; `clear` removes that namespace and
//! nothing else. Entries are JSON documents carrying their own creation and
//! expiry instants. A read that finds an expired entry evicts it and reports a
//! miss. Substrate failures are logged and degrade to a miss; they never reach
//! the caller.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use companion_shared::constants::CACHE_PREFIX;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use crate::kv::KvStore;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            if let Ok(delta) = chrono::Duration::from_std(by) {
                *now += delta;
            }
        }
    }
}

impl Default for ManualClock {
    /// Starts at the current whole second; entries persist millisecond precision.
    fn default() -> Self {
        Self::new(Utc::now().trunc_subsecs(0))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

/// A stored cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Stale once the clock has moved strictly past `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Full substrate key for a cache scope.
pub fn storage_key(scope: &str) -> String {
    format!("{CACHE_PREFIX}{scope}")
}

/// Typed view of the cache namespace.
pub struct CacheStore<T> {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheStore<T> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            clock: self.clock.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> CacheStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            clock,
            _value: PhantomData,
        }
    }

    /// Store `value` under `scope`, replacing any existing entry.
    pub async fn set(&self, scope: &str, value: &T, ttl: Duration) {
        if ttl.is_zero() {
            tracing::warn!(scope, "refusing to cache with zero ttl");
            return;
        }
        let created_at = self.clock.now();
        let Some(expires_at) = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
        else {
            tracing::warn!(scope, ?ttl, "cache ttl out of range");
            return;
        };

        let entry = CacheEntry {
            value,
            created_at,
            expires_at,
        };
        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(scope, error = %e, "failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = self.kv.set(&storage_key(scope), &json).await {
            tracing::warn!(scope, error = %e, "failed to write cache entry");
        }
    }

    /// Fresh value for `scope`, or `None`. Expired and unreadable entries are
    /// evicted before returning `None`.
    pub async fn get(&self, scope: &str) -> Option<T> {
        let key = storage_key(scope);
        let raw = match self.kv.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(scope, error = %e, "failed to read cache entry");
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(scope, error = %e, "evicting unreadable cache entry");
                self.evict(&key).await;
                return None;
            }
        };

        if entry.is_expired(self.clock.now()) {
            tracing::debug!(scope, "evicting expired cache entry");
            self.evict(&key).await;
            return None;
        }
        Some(entry.value)
    }

    /// Whether `scope` holds a fresh entry. Does not evict and does not
    /// deserialize the value.
    pub async fn is_valid(&self, scope: &str) -> bool {
        match self.kv.get(&storage_key(scope)).await {
            Ok(Some(raw)) => serde_json::from_str::<CacheEntry<IgnoredAny>>(&raw)
                .map(|entry| !entry.is_expired(self.clock.now()))
                .unwrap_or(false),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(scope, error = %e, "failed to probe cache entry");
                false
            }
        }
    }

    /// Remove the entry for `scope`. Removing an absent entry is a no-op.
    pub async fn delete(&self, scope: &str) {
        self.evict(&storage_key(scope)).await;
    }

    /// Remove every entry whose scope starts with `scope_prefix`.
    pub async fn delete_prefix(&self, scope_prefix: &str) {
        if let Err(e) = self.kv.remove_prefix(&storage_key(scope_prefix)).await {
            tracing::warn!(scope_prefix, error = %e, "failed to invalidate cache entries");
        }
    }

    /// Remove every cache entry, leaving unrelated substrate keys untouched.
    pub async fn clear(&self) {
        match self.kv.remove_prefix(CACHE_PREFIX).await {
            Ok(removed) => tracing::debug!(removed, "cleared cache"),
            Err(e) => tracing::warn!(error = %e, "failed to clear cache"),
        }
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = self.kv.remove(key).await {
            tracing::warn!(key, error = %e, "failed to evict cache entry");
        }
    }
}
