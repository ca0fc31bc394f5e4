//! Shared value types for the tickline workspace.
//!
//! Nothing in here owns a thread or a lock: these are the plain values that flow
//! between the dispatcher, the config store, the cache and the coordinator.

mod domain;
pub use domain::*;

mod config;
pub use config::*;
