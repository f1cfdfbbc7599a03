use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "packscope";
const CONFIG_FILE: &str = "config.json";

/// Extension of hash database cache files
pub const CACHE_EXTENSION: &str = "psdb";

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Get the directory holding hash database caches
pub fn get_cache_dir() -> Result<PathBuf> {
    let dir = get_app_data_dir()?.join("hashdb");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Default cache file for a source list.
///
/// The file is named after the source's stem so that `build` and `search`
/// agree on a location without extra flags.
pub fn default_cache_path(source: &str) -> Result<PathBuf> {
    Ok(get_cache_dir()?.join(cache_file_name(source)))
}

fn cache_file_name(source: &str) -> String {
    let stem = source
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or("default");

    // Sanitize (remove special chars, truncate)
    let sanitized: String = stem
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(32)
        .collect();

    let name = if sanitized.is_empty() { "default" } else { sanitized.as_str() };
    format!("{}-{:08x}.{}", name, crc32fast::hash(source.as_bytes()), CACHE_EXTENSION)
}
