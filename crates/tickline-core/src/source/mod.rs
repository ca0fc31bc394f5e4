//! Data sources and the registry that aggregates them.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use tickline_model::{ConfigDocument, Fields};
use tracing::{debug, error, instrument, trace, warn};

use crate::error::SourceError;

/// A provider of display fields for one category (`"system"`, `"stock"`, ...).
///
/// `fetch` is synchronous and runs on the refresh job's thread. Sources that
/// are merely disabled by configuration should return an empty map rather
/// than an error.
pub trait DataSource: Send + Sync {
    /// Category name this source answers for.
    fn supports(&self) -> &str;

    /// Produce the fields for the current configuration.
    fn fetch(&self, config: &ConfigDocument) -> Result<Fields, SourceError>;
}

/// Ordered set of data sources, at most one per category.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn DataSource>>,
}

impl SourceRegistry {
    #[inline]
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add `source`, replacing any source already registered for its category.
    pub fn register(&mut self, source: Arc<dyn DataSource>) {
        match self
            .sources
            .iter_mut()
            .find(|s| s.supports() == source.supports())
        {
            Some(slot) => {
                debug!(category = source.supports(), "data source replaced");
                *slot = source;
            }
            None => {
                trace!(category = source.supports(), "data source registered");
                self.sources.push(source);
            }
        }
    }

    #[inline]
    pub fn with(mut self, source: Arc<dyn DataSource>) -> Self {
        self.register(source);
        self
    }

    pub fn pick(&self, category: &str) -> Option<&Arc<dyn DataSource>> {
        self.sources.iter().find(|s| s.supports() == category)
    }

    pub fn categories(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.supports()).collect()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Merge every source's fields, in registration order.
    ///
    /// A failing or panicking source is logged and skipped; the rest still
    /// contribute. Later sources win on field-name collisions.
    #[instrument(level = "trace", skip_all)]
    pub fn collect(&self, config: &ConfigDocument) -> Fields {
        let mut merged = Fields::new();
        for source in &self.sources {
            let category = source.supports();
            match catch_unwind(AssertUnwindSafe(|| source.fetch(config))) {
                Ok(Ok(fields)) => {
                    trace!(category, fields = fields.len(), "source fetched");
                    merged.extend(fields);
                }
                Ok(Err(SourceError::Unavailable(reason))) => {
                    debug!(category, %reason, "source unavailable this cycle");
                }
                Ok(Err(e)) => warn!(category, error = %e, "source fetch failed"),
                Err(_) => error!(category, "source panicked during fetch"),
            }
        }
        merged
    }
}
