//! File-backed configuration store with change notification.
//!
//! The held document is always a complete tree: a missing or unparsable file is
//! replaced by the defaults on [`ConfigStore::load`]. Every replacement swaps the
//! whole `Arc<ConfigDocument>`, so a reader holding a snapshot never sees a
//! half-applied change.
//!
//! Subscribers are notified synchronously, in registration order, only when a
//! reload produced a document that differs by value from the held one.

pub mod path;

mod file;
mod watch;
pub use watch::WatchSettings;

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use arc_swap::ArcSwap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tickline_model::{ConfigDocument, default_document};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    error::ConfigError,
    sync::{lock, read, write},
};

/// Change callback; receives the document that was just swapped in.
pub type Subscriber = Arc<dyn Fn(&Arc<ConfigDocument>) + Send + Sync>;

/// Handle returned by [`ConfigStore::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Shared handle to the configuration store. Cheap to clone.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    current: ArcSwap<ConfigDocument>,
    /// Serialises everything that replaces `current` or writes the file.
    writer: Mutex<()>,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
    last_modified: Mutex<Option<SystemTime>>,
    watch_settings: WatchSettings,
    watch: Mutex<Option<watch::WatchHandle>>,
    watch_errors: AtomicU64,
}

impl ConfigStore {
    /// Open the store at `path` and load it (materialising defaults if needed).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::open_with(path, WatchSettings::default())
    }

    /// Like [`ConfigStore::open`] with a custom watch cadence.
    pub fn open_with(path: impl Into<PathBuf>, watch_settings: WatchSettings) -> Self {
        let store = Self {
            inner: Arc::new(Inner {
                path: path.into(),
                current: ArcSwap::from_pointee(default_document()),
                writer: Mutex::new(()),
                subscribers: RwLock::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                last_modified: Mutex::new(None),
                watch_settings,
                watch: Mutex::new(None),
                watch_errors: AtomicU64::new(0),
            }),
        };
        store.load();
        store
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Read the backing file into the store.
    ///
    /// A missing or corrupt file is replaced by the default document, which is
    /// persisted. Other read failures keep the defaults in memory only, so an
    /// unreadable file is never overwritten. Subscribers are not notified.
    #[instrument(level = "debug", skip(self), fields(path = %self.inner.path.display()))]
    pub fn load(&self) -> Arc<ConfigDocument> {
        let _writer = lock(&self.inner.writer);

        let doc = match file::read_document(&self.inner.path) {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() || e.is_corrupt() => {
                if e.is_not_found() {
                    info!("no configuration found; writing defaults");
                } else {
                    warn!(error = %e, "configuration is corrupt; regenerating defaults");
                }
                let defaults = default_document();
                if let Err(e) = file::write_document(&self.inner.path, &defaults) {
                    warn!(error = %e, "failed to persist default configuration");
                }
                defaults
            }
            Err(e) => {
                warn!(error = %e, "configuration unreadable; using defaults in memory");
                default_document()
            }
        };

        let doc = Arc::new(doc);
        self.inner.current.store(Arc::clone(&doc));
        self.remember_modified();
        doc
    }

    /// Persist `doc`, or the held document when `None`.
    ///
    /// Writing a document other than the held one does not swap it in. Its
    /// mtime is left unseen, so the watch loop reloads it and notifies
    /// subscribers like any external edit.
    pub fn save(&self, doc: Option<&ConfigDocument>) -> Result<(), ConfigError> {
        let _writer = lock(&self.inner.writer);
        match doc {
            Some(doc) => file::write_document(&self.inner.path, doc)?,
            None => {
                let held = self.inner.current.load_full();
                file::write_document(&self.inner.path, &held)?;
                self.remember_modified();
            }
        }
        Ok(())
    }

    /// Replace the held document and persist it. Subscribers are not notified.
    pub fn replace(&self, doc: ConfigDocument) -> Result<(), ConfigError> {
        if !doc.is_object() {
            return Err(ConfigError::NotAMap);
        }
        let _writer = lock(&self.inner.writer);
        let doc = Arc::new(doc);
        self.inner.current.store(Arc::clone(&doc));
        file::write_document(&self.inner.path, &doc)?;
        self.remember_modified();
        Ok(())
    }

    /// Current document. The snapshot stays valid across later swaps.
    #[inline]
    pub fn snapshot(&self) -> Arc<ConfigDocument> {
        self.inner.current.load_full()
    }

    /// Raw value at the dotted `key`, if present.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        path::lookup(&self.inner.current.load(), key).cloned()
    }

    /// Typed value at the dotted `key`, or `default` when the path is absent,
    /// crosses a non-map, or holds a value of another type.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let doc = self.inner.current.load();
        path::lookup(&doc, key)
            .and_then(|v| T::deserialize(v).ok())
            .unwrap_or(default)
    }

    /// Set the dotted `key` and persist the whole document.
    ///
    /// The in-memory change stands even when the write fails; the error is
    /// returned so the caller knows the file is behind.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), ConfigError> {
        let value = serde_json::to_value(value)?;
        let _writer = lock(&self.inner.writer);

        let mut next = ConfigDocument::clone(&self.inner.current.load());
        path::assign(&mut next, key, value)?;
        let next = Arc::new(next);
        self.inner.current.store(Arc::clone(&next));

        if let Err(e) = file::write_document(&self.inner.path, &next) {
            warn!(key, error = %e, "failed to persist configuration change");
            return Err(e);
        }
        self.remember_modified();
        debug!(key, "configuration value set");
        Ok(())
    }

    /// Re-read the file, swap it in and notify subscribers if it changed.
    ///
    /// Returns `Ok(true)` when subscribers were notified and `Ok(false)` when
    /// the content matched the held document. On error the held document is kept.
    #[instrument(level = "debug", skip(self), fields(path = %self.inner.path.display()))]
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let swapped = {
            let _writer = lock(&self.inner.writer);
            let fresh = match file::read_document(&self.inner.path) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(error = %e, "config reload failed; keeping previous document");
                    return Err(e);
                }
            };
            self.remember_modified();

            if *self.inner.current.load_full() == fresh {
                None
            } else {
                let fresh = Arc::new(fresh);
                self.inner.current.store(Arc::clone(&fresh));
                Some(fresh)
            }
        };

        match swapped {
            Some(doc) => {
                info!("configuration changed; notifying subscribers");
                self.notify(&doc);
                Ok(true)
            }
            None => {
                debug!("configuration reloaded; content unchanged");
                Ok(false)
            }
        }
    }

    /// Register `callback` for change notifications.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Arc<ConfigDocument>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
        write(&self.inner.subscribers).push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = write(&self.inner.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    fn notify(&self, doc: &Arc<ConfigDocument>) {
        // Snapshot the list so a subscriber may (un)subscribe without deadlocking.
        let subscribers: Vec<(SubscriptionId, Subscriber)> =
            read(&self.inner.subscribers).iter().cloned().collect();

        for (id, callback) in subscribers {
            if catch_unwind(AssertUnwindSafe(|| callback(doc))).is_err() {
                error!(subscription = id.0, "config subscriber panicked");
            }
        }
    }

    fn remember_modified(&self) {
        *lock(&self.inner.last_modified) = file::modified_at(&self.inner.path);
    }

    fn is_newer(&self, modified: SystemTime) -> bool {
        lock(&self.inner.last_modified).is_none_or(|seen| modified > seen)
    }

    fn mark_seen(&self, modified: SystemTime) {
        let mut seen = lock(&self.inner.last_modified);
        if seen.is_none_or(|s| modified > s) {
            *seen = Some(modified);
        }
    }
}
