use std::path::PathBuf;

use clap::Parser;

/// Render a periodically refreshed status line to stdout.
#[derive(Parser, Debug)]
#[command(name = "tickline-agentd")]
#[command(version)]
#[command(
    long_about = "Polls the configured data sources, renders the display line and rewrites it on every tick. \
                  Edits to the configuration file are picked up while running; SIGUSR1 forces a refresh."
)]
pub struct Cli {
    /// Configuration file (default: <config dir>/tickline/config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the cache snapshot (default: <cache dir>/tickline)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "tickline_core=debug"
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log output: text, json or journald
    #[arg(long, default_value = "text")]
    pub log_format: String,

    /// Render a single line and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,
}
