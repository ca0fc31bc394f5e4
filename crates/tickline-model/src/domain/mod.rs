mod task_id;
pub use task_id::TaskId;

mod update_state;
pub use update_state::UpdateState;

/// Named display fields produced by data sources (`"time" -> "12:00:01"`).
///
/// Ordered so that merged output and rendered diagnostics are deterministic.
pub type Fields = std::collections::BTreeMap<String, String>;

/// Configuration document: an ordered, arbitrarily nested JSON tree.
pub type ConfigDocument = serde_json::Value;

/// Task id reserved for refreshes armed by the periodic timer.
pub const TIMER_REFRESH_TASK: &str = "status_update";

/// Task id reserved for refreshes requested through a manual trigger.
pub const MANUAL_REFRESH_TASK: &str = "manual_update";

/// Task id used by the cache for background snapshot writes.
pub const CACHE_SNAPSHOT_TASK: &str = "save_cache";
