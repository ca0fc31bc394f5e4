use serde::{Deserialize, Serialize};

/// Observable state of the update coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateState {
    /// No timer armed and no refresh running.
    Idle,
    /// A timer is armed for the next tick.
    Scheduled,
    /// A refresh body is currently executing.
    Refreshing,
}

impl UpdateState {
    /// Returns `true` while the coordinator will still produce ticks on its own.
    pub fn is_active(&self) -> bool {
        matches!(self, UpdateState::Scheduled | UpdateState::Refreshing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_states() {
        assert!(UpdateState::Scheduled.is_active());
        assert!(UpdateState::Refreshing.is_active());
        assert!(!UpdateState::Idle.is_active());
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&UpdateState::Refreshing).unwrap();
        assert_eq!(json, r#""refreshing""#);
        let back: UpdateState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, UpdateState::Refreshing);
    }
}
