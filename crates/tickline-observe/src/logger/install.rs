use std::io;

use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    if tracing::dispatcher::has_been_set() {
        return Err(LoggerError::AlreadyInitialized);
    }
    let filter = filter(&cfg.directives())?;
    let output = output(cfg)?;

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)
}

fn output(cfg: &LoggerConfig) -> Result<BoxedLayer, LoggerError> {
    let layer = match cfg.format {
        LoggerFormat::Text => fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(cfg.ansi())
            .with_target(cfg.with_targets)
            .with_timer(local_rfc3339())
            .boxed(),
        LoggerFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_writer(io::stderr)
            .with_target(cfg.with_targets)
            .with_timer(local_rfc3339())
            .boxed(),
        LoggerFormat::Journald => journald()?,
    };
    Ok(layer)
}

fn filter(directives: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::builder()
        .parse(directives)
        .map_err(|e| LoggerError::BadFilter {
            filter: directives.to_string(),
            reason: e.to_string(),
        })
}

// Falls back to UTC when the offset cannot be determined safely.
fn local_rfc3339() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald() -> Result<BoxedLayer, LoggerError> {
    let layer = tracing_journald::layer().map_err(LoggerError::Journald)?;
    Ok(layer.with_syslog_identifier("tickline".to_string()).boxed())
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald() -> Result<BoxedLayer, LoggerError> {
    Err(LoggerError::JournaldUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_accepts_per_crate_directives() {
        assert!(filter("info,tickline_core=debug").is_ok());
    }

    #[test]
    fn bad_filter_names_the_input() {
        let err = filter("tickline=loud").unwrap_err();
        assert!(matches!(err, LoggerError::BadFilter { filter, .. } if filter == "tickline=loud"));
    }
}
