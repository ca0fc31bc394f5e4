mod cli;
mod paths;
mod sources;
mod surface;

use std::sync::Arc;

use clap::Parser;
use tracing::{debug, info};

use tickline_core::{CacheSettings, ConfigStore, Coordinator, Dispatcher, TtlCache};
use tickline_observe::{LoggerConfig, logger_init};

use cli::Cli;
use surface::LineSurface;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1) Logger
    let cfg = LoggerConfig {
        format: cli.log_format.parse()?,
        level: cli.log_level.clone(),
        ..Default::default()
    };
    logger_init(&cfg)?;

    // 2) Paths
    let config_path = paths::config_file(cli.config.as_deref())?;
    let snapshot_path = paths::cache_snapshot(cli.cache_dir.as_deref())?;
    info!(
        config = %config_path.display(),
        cache = %snapshot_path.display(),
        "paths resolved"
    );

    // 3) Dispatcher, configuration, cache
    let dispatcher = Dispatcher::spawn();
    let config = ConfigStore::open(config_path);
    let cache = TtlCache::with_dispatcher(
        CacheSettings::default().with_snapshot_path(snapshot_path),
        dispatcher.clone(),
    );
    cache.load_snapshot();

    // 4) Coordinator
    let coordinator = Coordinator::builder(dispatcher, config, cache, Arc::new(LineSurface::stdout()))
        .with_sources(sources::builtin())
        .build();

    if cli.once {
        let once = coordinator.clone();
        let outcome = tokio::task::spawn_blocking(move || once.refresh()).await?;
        debug!(?outcome, "single refresh done");
        coordinator.stop().await;
        return Ok(());
    }

    coordinator.start().await;
    info!("press Ctrl+C to stop");

    wait_for_shutdown(&coordinator).await?;
    info!("shutting down...");
    coordinator.stop().await;

    Ok(())
}

/// Block until Ctrl+C; SIGUSR1 requests a manual refresh meanwhile.
#[cfg(unix)]
async fn wait_for_shutdown(coordinator: &Coordinator) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut manual = signal(SignalKind::user_defined1())?;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => return Ok(res?),
            _ = manual.recv() => {
                let submitted = coordinator.update_now();
                debug!(submitted, "manual refresh requested");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_coordinator: &Coordinator) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
