//! Configuration management for the archiver.
//!
//! A config file (TOML or JSON, picked by extension) is applied onto
//! [`Settings`] defaults, then environment variables override both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::http_client::HttpSettings;
use crate::services::DEFAULT_MAX_CONTENT_LENGTH;

/// Config file name looked for in the working and user config directories.
pub const CONFIG_FILENAME: &str = "archiver.toml";

/// Default database filename inside the archive directory.
const DEFAULT_DATABASE_FILENAME: &str = "archiver.db";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory archived files are stored under.
    pub archive_dir: Option<PathBuf>,
    /// Public URL that serves `archive_dir`.
    pub cache_url_root: Option<String>,
    /// Database URL (defaults to `sqlite:{archive_dir}/archiver.db`).
    pub database_url: Option<String>,
    /// JSON catalog file.
    pub catalog_path: Option<PathBuf>,
    /// Largest download accepted, in bytes.
    pub max_content_length: u64,
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Verify TLS certificates.
    pub verify_https: bool,
    /// Proxy URL for all requests.
    pub proxy: Option<String>,
    /// User agent override.
    pub user_agent: Option<String>,
    /// Propagate unexpected errors instead of recording them.
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            archive_dir: None,
            cache_url_root: None,
            database_url: None,
            catalog_path: None,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            timeout: DEFAULT_TIMEOUT_SECS,
            verify_https: true,
            proxy: None,
            user_agent: None,
            debug: false,
        }
    }
}

impl Settings {
    /// Check that the settings required for archiving are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.archive_dir()?;
        if self
            .cache_url_root
            .as_deref()
            .map_or(true, |r| r.trim().is_empty())
        {
            return Err(ConfigError::Missing("cache_url_root"));
        }
        Ok(())
    }

    pub fn archive_dir(&self) -> Result<&Path, ConfigError> {
        self.archive_dir
            .as_deref()
            .ok_or(ConfigError::Missing("archive_dir"))
    }

    /// Get the database URL, constructing it from the archive dir if not set.
    pub fn database_url(&self) -> Result<String, ConfigError> {
        if let Some(ref url) = self.database_url {
            return Ok(url.clone());
        }
        let path = self.archive_dir()?.join(DEFAULT_DATABASE_FILENAME);
        Ok(format!("sqlite:{}", path.display()))
    }

    pub fn catalog_path(&self) -> Result<&Path, ConfigError> {
        self.catalog_path
            .as_deref()
            .ok_or(ConfigError::Missing("catalog"))
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.timeout),
            verify_https: self.verify_https,
            proxy: self.proxy.clone(),
            user_agent: self.user_agent.clone(),
        }
    }

    /// Ensure the archive directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        let dir = self.archive_dir()?;
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Read {
            path: dir.to_path_buf(),
            source,
        })
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(dir) = get("ARCHIVER_ARCHIVE_DIR") {
            self.archive_dir = Some(expand_path(&dir, None));
        }
        if let Some(root) = get("ARCHIVER_CACHE_URL_ROOT") {
            self.cache_url_root = Some(root);
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(catalog) = get("ARCHIVER_CATALOG") {
            self.catalog_path = Some(expand_path(&catalog, None));
        }
        if let Some(value) = get("ARCHIVER_MAX_CONTENT_LENGTH") {
            self.max_content_length = parse_number("ARCHIVER_MAX_CONTENT_LENGTH", &value)?;
        }
        if let Some(value) = get("ARCHIVER_TIMEOUT") {
            self.timeout = parse_number("ARCHIVER_TIMEOUT", &value)?;
        }
        if let Some(value) = get("ARCHIVER_VERIFY_HTTPS") {
            self.verify_https = parse_bool("ARCHIVER_VERIFY_HTTPS", &value)?;
        }
        if let Some(proxy) = get("ARCHIVER_PROXY") {
            self.proxy = Some(proxy);
        }
        if let Some(agent) = get("ARCHIVER_USER_AGENT") {
            self.user_agent = Some(agent);
        }
        if let Some(value) = get("ARCHIVER_DEBUG") {
            self.debug = parse_bool("ARCHIVER_DEBUG", &value)?;
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Expand `~` and resolve relative paths against `base_dir`.
fn expand_path(path_str: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = shellexpand::tilde(path_str);
    let path = Path::new(expanded.as_ref());

    match base_dir {
        Some(base) if !path.is_absolute() => base.join(path),
        _ => path.to_path_buf(),
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_url_root: Option<String>,
    /// Database URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Path to the JSON catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_content_length: Option<u64>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_https: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a specific file path.
    /// TOML for `.toml` files, JSON otherwise.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let mut config: Config = match ext {
            "json" => serde_json::from_str(&contents).map_err(|e| parse_err(e.to_string()))?,
            _ => toml::from_str(&contents).map_err(|e| parse_err(e.to_string()))?,
        };
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref dir) = self.archive_dir {
            settings.archive_dir = Some(expand_path(dir, Some(base_dir)));
        }
        if let Some(ref root) = self.cache_url_root {
            settings.cache_url_root = Some(root.clone());
        }
        if let Some(ref database) = self.database {
            settings.database_url = Some(database.clone());
        }
        if let Some(ref catalog) = self.catalog {
            settings.catalog_path = Some(expand_path(catalog, Some(base_dir)));
        }
        if let Some(max) = self.max_content_length {
            settings.max_content_length = max;
        }
        if let Some(timeout) = self.timeout {
            settings.timeout = timeout;
        }
        if let Some(verify) = self.verify_https {
            settings.verify_https = verify;
        }
        if let Some(ref proxy) = self.proxy {
            settings.proxy = Some(proxy.clone());
        }
        if let Some(ref agent) = self.user_agent {
            settings.user_agent = Some(agent.clone());
        }
        if let Some(debug) = self.debug {
            settings.debug = debug;
        }
    }
}

/// Find a config file: the explicit path, then `./archiver.toml`, then
/// `{config_dir}/archiver/archiver.toml`.
pub fn discover_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|d| d.join("archiver").join(CONFIG_FILENAME))
        .filter(|p| p.is_file())
}

/// Load settings from the discovered config file and the environment.
pub async fn load_settings(explicit: Option<&Path>) -> Result<(Settings, Config), ConfigError> {
    let config = match discover_config(explicit) {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            Config::load_from_path(&path).await?
        }
        None => Config::default(),
    };

    let base_dir = config
        .base_dir()
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env()?;
    Ok((settings, config))
}
