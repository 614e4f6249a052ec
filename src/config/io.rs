//! Reading and writing the configuration file
//!
//! Precedence, lowest first: built-in defaults, the config file, then
//! `THREADWISE_*` environment variables (a `.env` file counts as environment).

use secrecy::SecretString;
use std::path::Path;

use super::types::Config;
use crate::error::{Error, Result};

/// On-disk encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

impl Format {
    /// Pick by extension; `None` means sniff the contents
    fn of(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Some(Format::Toml),
            Some("json") | Some("json5") => Some(Format::Json),
            _ => None,
        }
    }

    fn parse(self, content: &str) -> Result<Config> {
        match self {
            Format::Toml => toml::from_str(content)
                .map_err(|e| Error::Config(format!("Invalid TOML config: {}", e))),
            // json5 also accepts comments and trailing commas
            Format::Json => json5::from_str(content)
                .map_err(|e| Error::Config(format!("Invalid JSON config: {}", e))),
        }
    }
}

/// Defaults, then the config file if present, then the environment
pub fn load_config() -> Result<Config> {
    let path = super::paths::config_path();
    let mut config = if path.exists() {
        load_config_from_path(&path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse the file at `path` without applying environment overrides
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Cannot read {}: {}", path.display(), e))
    })?;

    match Format::of(path) {
        Some(format) => format.parse(&content),
        None => Format::Toml
            .parse(&content)
            .or_else(|_| Format::Json.parse(&content))
            .map_err(|e| Error::Config(format!("{} is neither TOML nor JSON: {}", path.display(), e))),
    }
}

/// Overlay `THREADWISE_*` variables onto `config`, reading `.env` first.
/// Unparseable enum values are ignored.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();
    let var = |name: &str| std::env::var(name).ok();

    if let Some(api_key) = var("THREADWISE_COMPLETION_API_KEY") {
        config.completion.api_key = Some(SecretString::from(api_key));
    }
    if let Some(url) = var("THREADWISE_COMPLETION_BASE_URL") {
        config.completion.base_url = url;
    }
    if let Some(model) = var("THREADWISE_COMPLETION_MODEL") {
        config.completion.model = model;
    }

    if let Some(provider) = var("THREADWISE_EMBEDDING_PROVIDER") {
        if let Ok(provider) = provider.parse() {
            config.embedding.provider = provider;
        }
    }
    if let Some(url) = var("THREADWISE_EMBEDDING_BASE_URL") {
        config.embedding.base_url = Some(url);
    }
    if let Some(api_key) = var("THREADWISE_EMBEDDING_API_KEY") {
        config.embedding.api_key = Some(SecretString::from(api_key));
    }

    if let Some(scope) = var("THREADWISE_CACHE_SCOPE") {
        if let Ok(scope) = scope.parse() {
            config.cache.scope = scope;
        }
    }

    if let Some(level) = var("THREADWISE_LOG_LEVEL") {
        config.log.level = level;
    }
}

/// Write `config` as TOML, or JSON when `path` ends in `.json`.
/// API keys are never written.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = match Format::of(path) {
        Some(Format::Json) => serde_json::to_string_pretty(config)?,
        _ => toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Cannot encode config as TOML: {}", e)))?,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
