use tickline_core::{DataSource, SourceError, config::path};
use tickline_model::{ConfigDocument, Fields};

/// Exposes `custom_info.text` as the `custom_text` field, for use inside a
/// larger `display_format`.
pub struct CustomSource;

impl DataSource for CustomSource {
    fn supports(&self) -> &str {
        "custom"
    }

    fn fetch(&self, config: &ConfigDocument) -> Result<Fields, SourceError> {
        let text = path::lookup(config, "custom_info.text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(Fields::from([("custom_text".to_string(), text.to_string())]))
    }
}
