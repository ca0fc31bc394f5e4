mod custom;
mod system;

use std::sync::Arc;

use tickline_core::SourceRegistry;

pub use custom::CustomSource;
pub use system::SystemSource;

/// Sources shipped with the daemon.
pub fn builtin() -> SourceRegistry {
    SourceRegistry::new()
        .with(Arc::new(SystemSource::new()))
        .with(Arc::new(CustomSource))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_categories() {
        assert_eq!(builtin().categories(), vec!["system", "custom"]);
    }
}
