use std::io::IsTerminal;

use crate::logger::format::LoggerFormat;

/// Environment variable whose directives replace [`LoggerConfig::level`].
pub const LOG_ENV: &str = "TICKLINE_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChoice {
    /// Colour when stderr is a terminal.
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directives, e.g. `info,tickline_core=debug`.
    pub level: String,
    pub with_targets: bool,
    pub color: ColorChoice,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            color: ColorChoice::Auto,
        }
    }
}

impl LoggerConfig {
    pub(crate) fn ansi(&self) -> bool {
        match self.color {
            ColorChoice::Auto => std::io::stderr().is_terminal(),
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        }
    }

    /// Filter directives in effect: a non-blank [`LOG_ENV`] wins over `level`.
    pub(crate) fn directives(&self) -> String {
        pick_directives(std::env::var(LOG_ENV).ok(), &self.level)
    }
}

fn pick_directives(env: Option<String>, level: &str) -> String {
    env.filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| level.to_string())
}
