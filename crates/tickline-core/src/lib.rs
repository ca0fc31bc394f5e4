//! Scheduling and caching core of tickline.
//!
//! - [`Dispatcher`]: single-consumer FIFO work queue with per-id result slots.
//! - [`ConfigStore`]: file-backed JSON configuration with change notification.
//! - [`TtlCache`]: per-key TTL memoisation with an on-disk snapshot.
//! - [`Coordinator`]: periodic refresh with overlap suppression and hot reload.

pub mod error;
pub use error::{CacheError, ConfigError, RenderError, SourceError};

mod sync;

pub mod dispatcher;
pub use dispatcher::Dispatcher;

pub mod config;
pub use config::{ConfigStore, SubscriptionId, WatchSettings};

pub mod cache;
pub use cache::{CacheSettings, TtlCache};

pub mod source;
pub use source::{DataSource, SourceRegistry};

pub mod render;
pub use render::{RenderSurface, render_line};

pub mod coordinator;
pub use coordinator::{Coordinator, CoordinatorBuilder, CoordinatorSettings, RefreshOutcome};
