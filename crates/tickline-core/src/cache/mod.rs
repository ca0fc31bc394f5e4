//! Per-key TTL cache with an on-disk snapshot.
//!
//! Expiry is checked lazily on read: a stale entry stays stored (and is still
//! reachable through [`TtlCache::last_known`]) until it is overwritten or the
//! cache is cleared. Keys starting with the long-lived prefix use the long TTL,
//! everything else the default one.
//!
//! All access goes through one lock, held per operation and never across a
//! fetch, so a slow miss does not block other cache users.

mod snapshot;

use std::{
    collections::HashMap,
    fmt::Display,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

use serde_json::Value;
use tickline_model::CACHE_SNAPSHOT_TASK;
use tracing::{debug, info, trace, warn};

use crate::{dispatcher::Dispatcher, error::CacheError, sync::lock};
use snapshot::Snapshot;

/// Expiry classes and persistence cadence.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// TTL for ordinary keys.
    pub default_ttl: Duration,
    /// TTL for keys starting with `long_lived_prefix`.
    pub long_lived_ttl: Duration,
    pub long_lived_prefix: String,
    /// Schedule a background snapshot every this many inserts (`0` disables).
    pub persist_every: usize,
    /// Snapshot location; `None` keeps the cache memory-only.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(60),
            long_lived_ttl: Duration::from_secs(24 * 60 * 60),
            long_lived_prefix: "stock_name_".to_string(),
            persist_every: 5,
            snapshot_path: None,
        }
    }
}

impl CacheSettings {
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// TTL class of `key`.
    pub fn ttl_for(&self, key: &str) -> Duration {
        if key.starts_with(&self.long_lived_prefix) {
            self.long_lived_ttl
        } else {
            self.default_ttl
        }
    }
}

#[derive(Default)]
struct Entries {
    values: HashMap<String, Value>,
    stored_at: HashMap<String, SystemTime>,
    inserts: usize,
}

/// Shared handle to the cache. Cheap to clone.
#[derive(Clone)]
pub struct TtlCache {
    inner: Arc<Inner>,
}

struct Inner {
    settings: CacheSettings,
    entries: Mutex<Entries>,
    dispatcher: Option<Dispatcher>,
}

impl TtlCache {
    /// Memory-only cache (explicit snapshots still work if a path is set).
    pub fn new(settings: CacheSettings) -> Self {
        Self::build(settings, None)
    }

    /// Cache that writes periodic snapshots through `dispatcher`.
    pub fn with_dispatcher(settings: CacheSettings, dispatcher: Dispatcher) -> Self {
        Self::build(settings, Some(dispatcher))
    }

    fn build(settings: CacheSettings, dispatcher: Option<Dispatcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                entries: Mutex::new(Entries::default()),
                dispatcher,
            }),
        }
    }

    #[inline]
    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    /// Fresh value for `key`, honouring its TTL class.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, SystemTime::now())
    }

    fn get_at(&self, key: &str, now: SystemTime) -> Option<Value> {
        let entries = lock(&self.inner.entries);
        let stored = entries.stored_at.get(key)?;
        // A clock that stepped backwards counts as age zero.
        let age = now.duration_since(*stored).unwrap_or(Duration::ZERO);
        if age < self.inner.settings.ttl_for(key) {
            entries.values.get(key).cloned()
        } else {
            trace!(key, age_ms = age.as_millis() as u64, "cache entry stale");
            None
        }
    }

    /// Stored value for `key` regardless of age; the degraded fallback.
    pub fn last_known(&self, key: &str) -> Option<Value> {
        lock(&self.inner.entries).values.get(key).cloned()
    }

    /// Store `value` with a fresh timestamp.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.put_at(key.into(), value, SystemTime::now());
    }

    fn put_at(&self, key: String, value: Value, now: SystemTime) {
        let inserts = {
            let mut entries = lock(&self.inner.entries);
            entries.stored_at.insert(key.clone(), now);
            entries.values.insert(key, value);
            entries.inserts = entries.inserts.wrapping_add(1);
            entries.inserts
        };

        let every = self.inner.settings.persist_every;
        if every > 0 && inserts % every == 0 {
            self.schedule_snapshot();
        }
    }

    /// Cached value for `key`, or the result of `fetch` on a miss.
    ///
    /// `fetch` runs without the cache lock. On failure the last known value
    /// (possibly stale) is returned instead.
    pub fn get_or_fetch<F, E>(&self, key: &str, fetch: F) -> Option<Value>
    where
        F: FnOnce() -> Result<Value, E>,
        E: Display,
    {
        if let Some(hit) = self.get(key) {
            return Some(hit);
        }
        match fetch() {
            Ok(value) => {
                self.put(key, value.clone());
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "fetch failed; serving last known value");
                self.last_known(key)
            }
        }
    }

    /// Drop every entry and timestamp.
    pub fn clear(&self) {
        let mut entries = lock(&self.inner.entries);
        let dropped = entries.values.len();
        entries.values.clear();
        entries.stored_at.clear();
        if dropped > 0 {
            info!(dropped, "cache cleared");
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the contents with the snapshot on disk. Failures are logged and
    /// leave the cache as it was.
    pub fn load_snapshot(&self) {
        let Some(path) = self.inner.settings.snapshot_path.as_deref() else {
            return;
        };
        let mut entries = lock(&self.inner.entries);
        match snapshot::read(path) {
            Ok(Some(Snapshot { values, stored_at })) => {
                debug!(entries = values.len(), path = %path.display(), "cache snapshot loaded");
                entries.values = values;
                entries.stored_at = stored_at;
            }
            Ok(None) => trace!(path = %path.display(), "no cache snapshot yet"),
            Err(e) => warn!(error = %e, path = %path.display(), "failed to load cache snapshot"),
        }
    }

    /// Write the full cache to the snapshot file. Failures are logged.
    pub fn save_snapshot(&self) {
        if let Err(e) = self.try_save_snapshot() {
            warn!(error = %e, "failed to save cache snapshot");
        }
    }

    fn try_save_snapshot(&self) -> Result<(), CacheError> {
        let Some(path) = self.inner.settings.snapshot_path.as_deref() else {
            return Ok(());
        };
        let entries = lock(&self.inner.entries);
        let snapshot = Snapshot {
            values: entries.values.clone(),
            stored_at: entries.stored_at.clone(),
        };
        snapshot::write(path, &snapshot)?;
        trace!(entries = snapshot.values.len(), "cache snapshot saved");
        Ok(())
    }

    fn schedule_snapshot(&self) {
        let (Some(dispatcher), Some(_)) = (
            self.inner.dispatcher.as_ref(),
            self.inner.settings.snapshot_path.as_ref(),
        ) else {
            return;
        };
        let cache = self.clone();
        dispatcher.submit_with_id(CACHE_SNAPSHOT_TASK, move || {
            cache.try_save_snapshot()?;
            Ok(Value::Bool(true))
        });
    }
}
