use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?} (expected text, json or journald)")]
    UnknownFormat(String),
    #[error("journald output needs linux and the `journald` feature")]
    JournaldUnavailable,
    #[error("could not connect to journald: {0}")]
    Journald(#[source] std::io::Error),
    #[error("invalid log filter {filter:?}: {reason}")]
    BadFilter { filter: String, reason: String },
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}
