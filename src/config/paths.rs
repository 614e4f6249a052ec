//! Where configuration lives on disk

use std::path::PathBuf;

/// Directory holding `config.toml`; `THREADWISE_CONFIG_DIR` wins
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("THREADWISE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    dirs::config_dir()
        .map(|d| d.join("threadwise"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config").join("threadwise"))
                .unwrap_or_else(|| PathBuf::from(".threadwise"))
        })
}

/// Configuration file; `THREADWISE_CONFIG` wins
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("THREADWISE_CONFIG") {
        return PathBuf::from(path);
    }

    config_dir().join("config.toml")
}
