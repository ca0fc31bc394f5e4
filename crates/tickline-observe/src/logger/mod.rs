mod config;
mod error;
mod format;
mod install;

pub use config::{ColorChoice, LOG_ENV, LoggerConfig};
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Install the process-wide `tracing` subscriber described by `cfg`.
///
/// Output always goes to stderr or journald; stdout is left to the caller.
/// Fails with [`LoggerError::AlreadyInitialized`] if a subscriber is already set.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    install::install(cfg)
}
