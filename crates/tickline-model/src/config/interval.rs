use std::time::Duration;

use crate::{ConfigDocument, DEFAULT_UPDATE_INTERVAL_SECS};

/// Top-level key holding the polling interval in seconds.
pub const UPDATE_INTERVAL_KEY: &str = "update_interval";

/// Polling interval carried by `doc`.
///
/// Accepts integer or fractional seconds. Missing, non-numeric, non-finite
/// and non-positive values fall back to the default.
pub fn update_interval(doc: &ConfigDocument) -> Duration {
    doc.get(UPDATE_INTERVAL_KEY)
        .and_then(|v| v.as_f64())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS))
}
