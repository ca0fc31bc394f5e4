use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::error::ConfigError;
use tickline_model::ConfigDocument;

/// Strict read: any I/O or parse problem is an error.
pub(crate) fn read_document(path: &Path) -> Result<ConfigDocument, ConfigError> {
    let raw = fs::read_to_string(path)?;
    let doc: ConfigDocument = serde_json::from_str(&raw)?;
    if !doc.is_object() {
        return Err(ConfigError::NotAMap);
    }
    Ok(doc)
}

/// Rewrite the whole file: pretty JSON to a sibling temp file, then rename over.
pub(crate) fn write_document(path: &Path, doc: &ConfigDocument) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut body = serde_json::to_string_pretty(doc)?;
    body.push('\n');

    let tmp = temp_sibling(path);
    fs::write(&tmp, body)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

pub(crate) fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config.json".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_then_read_preserves_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let doc = json!({"z": 1, "a": {"text": "自定义信息"}});

        write_document(&path, &doc).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("自定义信息"));
        assert!(raw.find("\"z\"").unwrap() < raw.find("\"a\"").unwrap());
        assert_eq!(read_document(&path).unwrap(), doc);
        assert!(!dir.path().join("nested").join(".config.json.tmp").exists());
    }

    #[test]
    fn rejects_non_object_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(read_document(&path), Err(ConfigError::NotAMap)));
    }

    #[test]
    fn reports_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert!(read_document(&path).unwrap_err().is_not_found());

        fs::write(&path, "{ not json").unwrap();
        assert!(read_document(&path).unwrap_err().is_corrupt());
    }
}
