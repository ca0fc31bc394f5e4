use std::path::{Path, PathBuf};

use anyhow::Context;

const APP_DIR: &str = "tickline";

/// Configuration file location: the override, or `<config dir>/tickline/config.json`.
pub fn config_file(overridden: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = overridden {
        return Ok(path.to_path_buf());
    }
    let base = dirs::config_dir().context("could not determine the user configuration directory")?;
    Ok(base.join(APP_DIR).join("config.json"))
}

/// Cache snapshot location inside the override directory or `<cache dir>/tickline`.
pub fn cache_snapshot(dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::cache_dir()
            .context("could not determine the user cache directory")?
            .join(APP_DIR),
    };
    Ok(dir.join("cache.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_are_used_verbatim() {
        let config = config_file(Some(Path::new("/etc/tickline.json"))).unwrap();
        assert_eq!(config, PathBuf::from("/etc/tickline.json"));

        let cache = cache_snapshot(Some(Path::new("/var/cache/tl"))).unwrap();
        assert_eq!(cache, PathBuf::from("/var/cache/tl/cache.json"));
    }
}
