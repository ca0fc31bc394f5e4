//! Periodic update coordinator.
//!
//! Owns the polling cadence. Every tick submits a refresh job to the
//! [`Dispatcher`] and re-arms itself, whether or not the previous refresh has
//! finished. Refresh bodies are guarded by a non-blocking flag: a refresh that
//! finds another one in progress returns immediately and is not retried.
//!
//! Configuration changes re-arm the timer when the interval moved, clear the
//! [`TtlCache`] and request an immediate refresh.

mod guard;

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tickline_model::{
    ConfigDocument, MANUAL_REFRESH_TASK, TIMER_REFRESH_TASK, UpdateState, update_interval,
};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    cache::TtlCache,
    config::{ConfigStore, SubscriptionId},
    dispatcher::Dispatcher,
    render::{RenderSurface, render_line},
    source::{DataSource, SourceRegistry},
    sync::lock,
};
use guard::RefreshGuard;

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// A manual trigger this soon after an attempt that is still running is ignored.
    pub debounce: Duration,
    /// Transient text shown when a manual refresh is requested.
    pub refreshing_text: String,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            refreshing_text: "refreshing...".to_string(),
        }
    }
}

/// What one refresh body did; recorded as the refresh task's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RefreshOutcome {
    /// Another refresh was in progress; nothing was done.
    Skipped,
    /// A line was rendered and applied.
    Rendered { line: String },
    /// The display format could not be expanded; a notice was shown instead.
    FormatError { error: String },
    /// The render surface panicked while applying the text.
    SurfacePanicked,
}

pub struct CoordinatorBuilder {
    dispatcher: Dispatcher,
    config: ConfigStore,
    cache: TtlCache,
    surface: Arc<dyn RenderSurface>,
    sources: SourceRegistry,
    settings: CoordinatorSettings,
}

impl CoordinatorBuilder {
    pub fn with_sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.sources.register(source);
        self
    }

    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Coordinator {
        let interval = update_interval(&self.config.snapshot());
        Coordinator {
            inner: Arc::new(Inner {
                dispatcher: self.dispatcher,
                config: self.config,
                cache: self.cache,
                surface: self.surface,
                sources: self.sources,
                settings: self.settings,
                interval: Mutex::new(interval),
                timer: Mutex::new(None),
                runtime: Mutex::new(None),
                refreshing: AtomicBool::new(false),
                last_attempt: Mutex::new(None),
                subscription: Mutex::new(None),
                stopped: AtomicBool::new(false),
                refreshes: AtomicU64::new(0),
            }),
        }
    }
}

/// Shared handle to the coordinator. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    dispatcher: Dispatcher,
    config: ConfigStore,
    cache: TtlCache,
    surface: Arc<dyn RenderSurface>,
    sources: SourceRegistry,
    settings: CoordinatorSettings,

    interval: Mutex<Duration>,
    timer: Mutex<Option<JoinHandle<()>>>,
    runtime: Mutex<Option<Handle>>,
    refreshing: AtomicBool,
    last_attempt: Mutex<Option<Instant>>,
    subscription: Mutex<Option<SubscriptionId>>,
    stopped: AtomicBool,
    refreshes: AtomicU64,
}

impl Coordinator {
    pub fn builder(
        dispatcher: Dispatcher,
        config: ConfigStore,
        cache: TtlCache,
        surface: Arc<dyn RenderSurface>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            dispatcher,
            config,
            cache,
            surface,
            sources: SourceRegistry::new(),
            settings: CoordinatorSettings::default(),
        }
    }

    /// Refresh once, start watching the config file, then arm the timer.
    #[instrument(level = "debug", skip(self))]
    pub async fn start(&self) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            warn!("coordinator already stopped; start ignored");
            return;
        }
        *lock(&self.inner.runtime) = Some(Handle::current());
        self.subscribe_to_config();

        let inner = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || inner.refresh()).await {
            Ok(outcome) => debug!(?outcome, "initial refresh done"),
            Err(e) => error!(error = %e, "initial refresh panicked"),
        }

        self.inner.config.start_watch();
        Inner::arm_timer(&self.inner);
        info!(
            interval_ms = self.interval().as_millis() as u64,
            "coordinator started"
        );
    }

    /// Manual trigger. Returns `true` when a refresh job was submitted.
    ///
    /// Ignored entirely when the last attempt is recent and still running.
    /// Otherwise shows the transient "refreshing" text, and submits a job
    /// unless a refresh is already in progress.
    pub fn update_now(&self) -> bool {
        Inner::update_now(&self.inner)
    }

    /// Run one refresh body on the calling thread.
    ///
    /// Panics from sources or the render surface are caught and logged; they
    /// never unwind into the caller.
    pub fn refresh(&self) -> RefreshOutcome {
        self.inner.refresh()
    }

    /// Cancel the timer, stop the config watch, shut the dispatcher down, in
    /// that order, then write a final cache snapshot.
    #[instrument(level = "debug", skip(self))]
    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(timer) = lock(&self.inner.timer).take() {
            timer.abort();
        }
        if let Some(id) = lock(&self.inner.subscription).take() {
            self.inner.config.unsubscribe(id);
        }
        self.inner.config.stop_watch().await;
        self.inner.dispatcher.shutdown().await;

        let cache = self.inner.cache.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || cache.save_snapshot()).await {
            warn!(error = %e, "final cache snapshot panicked");
        }
        info!("coordinator stopped");
    }

    pub fn state(&self) -> UpdateState {
        if self.inner.refreshing.load(Ordering::Acquire) {
            UpdateState::Refreshing
        } else if lock(&self.inner.timer)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
        {
            UpdateState::Scheduled
        } else {
            UpdateState::Idle
        }
    }

    /// Interval the timer is (or will be) armed with.
    pub fn interval(&self) -> Duration {
        *lock(&self.inner.interval)
    }

    /// When the last refresh body started.
    pub fn last_attempt(&self) -> Option<Instant> {
        *lock(&self.inner.last_attempt)
    }

    /// Number of refresh bodies that ran to completion.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refreshes.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    #[inline]
    pub fn config(&self) -> &ConfigStore {
        &self.inner.config
    }

    #[inline]
    pub fn cache(&self) -> &TtlCache {
        &self.inner.cache
    }

    fn subscribe_to_config(&self) {
        let mut subscription = lock(&self.inner.subscription);
        if subscription.is_some() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        *subscription = Some(self.inner.config.subscribe(move |doc| {
            if let Some(inner) = weak.upgrade() {
                Inner::on_config_changed(&inner, doc);
            }
        }));
    }
}

impl Inner {
    fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = RefreshGuard::try_acquire(&self.refreshing) else {
            trace!("refresh already in progress; skipping");
            return RefreshOutcome::Skipped;
        };
        *lock(&self.last_attempt) = Some(Instant::now());

        let config = self.config.snapshot();
        let fields = self.sources.collect(&config);
        let outcome = catch_unwind(AssertUnwindSafe(|| match render_line(&config, &fields) {
            Ok(line) => {
                self.surface.apply_display_text(&line);
                RefreshOutcome::Rendered { line }
            }
            Err(e) => {
                warn!(error = %e, "display format could not be rendered");
                self.surface.apply_transient_text(&format!("format error: {e}"));
                RefreshOutcome::FormatError {
                    error: e.to_string(),
                }
            }
        }))
        .unwrap_or_else(|_| {
            error!("render surface panicked");
            RefreshOutcome::SurfacePanicked
        });

        self.refreshes.fetch_add(1, Ordering::SeqCst);
        trace!(?outcome, "refresh finished");
        outcome
    }

    fn submit_refresh(inner: &Arc<Inner>, task: &'static str) {
        let weak = Arc::downgrade(inner);
        inner.dispatcher.submit_with_id(task, move || {
            let Some(inner) = weak.upgrade() else {
                return Ok(Value::Null);
            };
            Ok(serde_json::to_value(inner.refresh())?)
        });
    }

    fn update_now(inner: &Arc<Inner>) -> bool {
        if inner.stopped.load(Ordering::SeqCst) {
            return false;
        }
        let in_progress = inner.refreshing.load(Ordering::Acquire);
        let recent = lock(&inner.last_attempt)
            .is_some_and(|started| started.elapsed() < inner.settings.debounce);
        if recent && in_progress {
            trace!("manual refresh debounced");
            return false;
        }

        inner
            .surface
            .apply_transient_text(&inner.settings.refreshing_text);
        if in_progress {
            trace!("refresh in progress; manual trigger not queued");
            return false;
        }
        Inner::submit_refresh(inner, MANUAL_REFRESH_TASK);
        true
    }

    /// Arm (or re-arm) the periodic timer with the current interval.
    fn arm_timer(inner: &Arc<Inner>) {
        if inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        let Some(runtime) = lock(&inner.runtime).clone() else {
            warn!("coordinator has no runtime; timer not armed");
            return;
        };

        let period = *lock(&inner.interval);
        let weak = Arc::downgrade(inner);
        let task = runtime.spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.stopped.load(Ordering::SeqCst) {
                    break;
                }
                trace!("timer tick");
                Inner::submit_refresh(&inner, TIMER_REFRESH_TASK);
            }
        });

        if let Some(previous) = lock(&inner.timer).replace(task) {
            previous.abort();
        }
        // stop() may have run between the check above and the replace.
        if inner.stopped.load(Ordering::SeqCst)
            && let Some(task) = lock(&inner.timer).take()
        {
            task.abort();
        }
        debug!(interval_ms = period.as_millis() as u64, "timer armed");
    }

    fn on_config_changed(inner: &Arc<Inner>, doc: &Arc<ConfigDocument>) {
        let next = update_interval(doc);
        let previous = std::mem::replace(&mut *lock(&inner.interval), next);

        if previous != next {
            info!(
                from_ms = previous.as_millis() as u64,
                to_ms = next.as_millis() as u64,
                "polling interval changed; re-arming timer"
            );
            let armed = lock(&inner.timer).is_some();
            if armed {
                Inner::arm_timer(inner);
            }
        }

        inner.cache.clear();
        Inner::update_now(inner);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tickline_model::Fields;

    use super::*;
    use crate::{cache::CacheSettings, error::SourceError};

    #[derive(Default)]
    struct Recording {
        lines: Mutex<Vec<String>>,
        transient: Mutex<Vec<String>>,
    }

    impl RenderSurface for Recording {
        fn apply_display_text(&self, text: &str) {
            self.lines.lock().unwrap().push(text.to_string());
        }
        fn apply_transient_text(&self, text: &str) {
            self.transient.lock().unwrap().push(text.to_string());
        }
    }

    struct Clock;

    impl DataSource for Clock {
        fn supports(&self) -> &str {
            "clock"
        }
        fn fetch(&self, _config: &ConfigDocument) -> Result<Fields, SourceError> {
            Ok(Fields::from([("time".to_string(), "12:00".to_string())]))
        }
    }

    fn coordinator(dir: &std::path::Path, format: &str) -> (Coordinator, Arc<Recording>) {
        let config = ConfigStore::open(dir.join("config.json"));
        config.set("display_format", format).unwrap();
        let surface = Arc::new(Recording::default());
        let coordinator = Coordinator::builder(
            Dispatcher::spawn(),
            config,
            TtlCache::new(CacheSettings::default()),
            surface.clone(),
        )
        .with_source(Arc::new(Clock))
        .build();
        (coordinator, surface)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn refresh_renders_through_the_surface() {
        let dir = tempfile::tempdir().unwrap();
        let (c, surface) = coordinator(dir.path(), "at {time}");

        assert!(c.last_attempt().is_none());
        let outcome = c.refresh();
        assert_eq!(
            outcome,
            RefreshOutcome::Rendered {
                line: "at 12:00".into()
            }
        );
        assert_eq!(*surface.lines.lock().unwrap(), vec!["at 12:00"]);
        assert_eq!(c.refresh_count(), 1);
        assert!(c.last_attempt().is_some());
        assert_eq!(c.state(), UpdateState::Idle);
    }

    struct Broken;

    impl RenderSurface for Broken {
        fn apply_display_text(&self, _text: &str) {
            panic!("display went away");
        }
        fn apply_transient_text(&self, _text: &str) {}
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_surface_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::open(dir.path().join("config.json"));
        config.set("display_format", "at {time}").unwrap();
        let c = Coordinator::builder(
            Dispatcher::spawn(),
            config,
            TtlCache::new(CacheSettings::default()),
            Arc::new(Broken),
        )
        .with_source(Arc::new(Clock))
        .build();

        assert_eq!(c.refresh(), RefreshOutcome::SurfacePanicked);
        assert_eq!(c.state(), UpdateState::Idle);
        assert_eq!(c.refresh(), RefreshOutcome::SurfacePanicked);
        assert_eq!(c.refresh_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_field_shows_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let (c, surface) = coordinator(dir.path(), "{price}");

        let outcome = c.refresh();
        assert!(matches!(outcome, RefreshOutcome::FormatError { .. }));
        assert!(surface.lines.lock().unwrap().is_empty());
        assert_eq!(
            *surface.transient.lock().unwrap(),
            vec!["format error: 'price'"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn config_change_before_start_updates_interval_only() {
        let dir = tempfile::tempdir().unwrap();
        let (c, _surface) = coordinator(dir.path(), "{time}");
        assert_eq!(c.interval(), Duration::from_secs(5));
        c.cache().put("k", json!(1));

        let mut doc = (*c.config().snapshot()).clone();
        doc["update_interval"] = json!(2);
        Inner::on_config_changed(&c.inner, &Arc::new(doc));

        assert_eq!(c.interval(), Duration::from_secs(2));
        assert!(c.cache().is_empty());
        assert!(lock(&c.inner.timer).is_none());

        let manual = c
            .dispatcher()
            .wait_result(MANUAL_REFRESH_TASK, Some(Duration::from_secs(2)))
            .await;
        assert_eq!(manual, Some(json!({"outcome": "rendered", "line": "12:00"})));
    }

    #[test]
    fn outcome_is_tagged() {
        assert_eq!(
            serde_json::to_value(RefreshOutcome::Skipped).unwrap(),
            json!({"outcome": "skipped"})
        );
        assert_eq!(
            serde_json::to_value(RefreshOutcome::FormatError { error: "x".into() }).unwrap(),
            json!({"outcome": "formatError", "error": "x"})
        );
    }
}
