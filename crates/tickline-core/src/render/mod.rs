//! Turning collected fields into the single display line.

use tickline_model::{ConfigDocument, Fields};

use crate::{config::path, error::RenderError};

/// Where display text ends up (menu-bar title, terminal, ...).
///
/// Called from the coordinator's background contexts; implementations must be
/// safe to call from any thread or marshal onto their own.
pub trait RenderSurface: Send + Sync {
    /// Show a freshly rendered line.
    fn apply_display_text(&self, text: &str);

    /// Show a placeholder such as "refreshing..." or an error notice.
    fn apply_transient_text(&self, text: &str);
}

/// Render the line for `config` from `fields`.
///
/// Enabled, non-empty `custom_info.text` wins outright. Otherwise every
/// `{name}` in `display_format` is replaced by the field of that name; `{{` and
/// `}}` stand for literal braces.
pub fn render_line(config: &ConfigDocument, fields: &Fields) -> Result<String, RenderError> {
    let custom_enabled = path::lookup(config, "custom_info.enabled")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if custom_enabled
        && let Some(text) = path::lookup(config, "custom_info.text").and_then(|v| v.as_str())
        && !text.is_empty()
    {
        return Ok(text.to_string());
    }

    let template = path::lookup(config, "display_format")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    expand(template, fields)
}

fn expand(template: &str, fields: &Fields) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(RenderError::Unterminated),
                    }
                }
                let value = fields
                    .get(name.trim())
                    .ok_or_else(|| RenderError::MissingField(name.trim().to_string()))?;
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(RenderError::StrayBrace),
            other => out.push(other),
        }
    }
    Ok(out)
}
