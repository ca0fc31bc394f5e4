mod defaults;
pub use defaults::{DEFAULT_UPDATE_INTERVAL_SECS, default_document};

mod interval;
pub use interval::{UPDATE_INTERVAL_KEY, update_interval};
