use std::{
    io::{self, Write},
    sync::Mutex,
};

use tickline_core::RenderSurface;
use tracing::debug;

/// Writes each line to a byte sink, one per line; transient text is prefixed with `…`.
pub struct LineSurface<W> {
    out: Mutex<W>,
}

impl LineSurface<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> LineSurface<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn emit(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            debug!(error = %e, "failed to write display line");
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|p| p.into_inner())
    }
}

impl<W: Write + Send> RenderSurface for LineSurface<W> {
    fn apply_display_text(&self, text: &str) {
        self.emit(text);
    }

    fn apply_transient_text(&self, text: &str) {
        self.emit(&format!("… {text}"));
    }
}
