use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config root must be a JSON object")]
    NotAMap,
    #[error("invalid config path: {0:?}")]
    InvalidPath(String),
}

impl ConfigError {
    /// Returns `true` when the backing file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Returns `true` when the file exists but does not hold a usable document.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, ConfigError::Json(_) | ConfigError::NotAMap)
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache snapshot is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by a data source for one fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The data is not available right now (disabled upstream, no network, ...).
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("source failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("'{0}'")]
    MissingField(String),
    #[error("unterminated placeholder in display format")]
    Unterminated,
    #[error("single '}}' encountered in display format")]
    StrayBrace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_config_errors() {
        let missing = ConfigError::from(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(missing.is_not_found());
        assert!(!missing.is_corrupt());

        let corrupt = ConfigError::from(serde_json::from_str::<serde_json::Value>("{").unwrap_err());
        assert!(corrupt.is_corrupt());
        assert!(ConfigError::NotAMap.is_corrupt());
    }

    #[test]
    fn missing_field_names_the_field() {
        let err = RenderError::MissingField("cpu".into());
        assert_eq!(format!("format error: {err}"), "format error: 'cpu'");
    }
}
