use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use wordvec_server::ServerConfig;
use wordvec_store::ServiceConfig;

pub(crate) const CONFIG_ENV: &str = "WORDVEC_CONFIG";
pub(crate) const CONFIG_FILE_NAME: &str = "wordvec.toml";
pub(crate) const DEFAULT_URL: &str = "wordvec-data";

/// Settings read from `wordvec.toml`; command-line flags override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    /// Store address: `http(s)://…`, `memory://`, `file://…` or a directory path.
    pub url: String,
    pub progress: bool,
    pub camel: bool,
    pub store: ServiceConfig,
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            progress: false,
            camel: false,
            store: ServiceConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load the first config file found; defaults when there is none.
    /// An explicit path must exist.
    pub(crate) fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let config = Self::read(path)?;
            return Ok((config, Some(path.to_path_buf())));
        }
        for candidate in search_path() {
            if candidate.is_file() {
                let config = Self::read(&candidate)?;
                return Ok((config, Some(candidate)));
            }
        }
        Ok((Self::default(), None))
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }
}

fn search_path() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(from_env) = env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        paths.push(PathBuf::from(from_env));
    }
    if let Ok(cwd) = env::current_dir() {
        paths.push(cwd.join(CONFIG_FILE_NAME));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(format!(".{CONFIG_FILE_NAME}")));
    }
    paths
}
