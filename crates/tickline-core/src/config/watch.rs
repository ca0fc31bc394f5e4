//! Modification-time polling for the configuration file.

use std::{
    io,
    sync::{
        Arc, Weak,
        atomic::Ordering,
    },
    time::{Duration, SystemTime},
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{ConfigStore, Inner};
use crate::{error::ConfigError, sync::lock};

/// Cadence of the watch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Pause between modification-time checks.
    pub poll: Duration,
    /// Pause between noticing a change and reading the file.
    pub settle: Duration,
    /// Pause after the loop itself failed (not a reload failure).
    pub backoff: Duration,
    /// How long [`ConfigStore::stop_watch`] waits for the loop to exit.
    pub join_timeout: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(1),
            settle: Duration::from_millis(500),
            backoff: Duration::from_secs(5),
            join_timeout: Duration::from_secs(1),
        }
    }
}

pub(super) struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ConfigStore {
    /// Start the background watch loop. No-op when it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_watch(&self) {
        let mut slot = lock(&self.inner.watch);
        if slot.as_ref().is_some_and(|w| !w.task.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(watch_loop(
            Arc::downgrade(&self.inner),
            cancel.clone(),
            self.inner.watch_settings,
        ));
        *slot = Some(WatchHandle { cancel, task });
        debug!(path = %self.inner.path.display(), "config watch started");
    }

    /// Stop the watch loop and wait briefly for it to exit.
    pub async fn stop_watch(&self) {
        let handle = lock(&self.inner.watch).take();
        let Some(WatchHandle { cancel, mut task }) = handle else {
            return;
        };

        cancel.cancel();
        if tokio::time::timeout(self.inner.watch_settings.join_timeout, &mut task)
            .await
            .is_err()
        {
            warn!("config watch did not stop in time; aborting");
            task.abort();
        }
        debug!("config watch stopped");
    }

    /// Returns `true` while the watch loop is running.
    pub fn is_watching(&self) -> bool {
        lock(&self.inner.watch)
            .as_ref()
            .is_some_and(|w| !w.task.is_finished())
    }

    /// Number of times the watch loop itself failed and backed off.
    pub fn watch_errors(&self) -> u64 {
        self.inner.watch_errors.load(Ordering::Relaxed)
    }

    /// One iteration: detect a newer file, let it settle, reload.
    ///
    /// Reload failures are logged here and do not count as loop failures.
    async fn poll_once(
        &self,
        cancel: &CancellationToken,
        settings: WatchSettings,
    ) -> Result<(), ConfigError> {
        let Some(modified) = file_modified(self).await? else {
            return Ok(());
        };
        if !self.is_newer(modified) {
            return Ok(());
        }

        trace!("config file modified; waiting for writes to settle");
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(settings.settle) => {}
        }

        // The file is marked as seen either way, so a broken edit is reported once.
        let _ = self.reload();
        self.mark_seen(modified);
        Ok(())
    }
}

async fn file_modified(store: &ConfigStore) -> Result<Option<SystemTime>, ConfigError> {
    match tokio::fs::metadata(&store.inner.path).await {
        Ok(meta) => Ok(Some(meta.modified()?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn watch_loop(inner: Weak<Inner>, cancel: CancellationToken, settings: WatchSettings) {
    loop {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let store = ConfigStore { inner };

        let pause = match store.poll_once(&cancel, settings).await {
            Ok(()) => settings.poll,
            Err(e) => {
                store.inner.watch_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, backoff_ms = settings.backoff.as_millis() as u64, "config watch error; backing off");
                settings.backoff
            }
        };
        drop(store);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
    trace!("config watch loop exited");
}
