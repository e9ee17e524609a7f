//! User settings
//!
//! Stored as JSON in `<config dir>/uindex/settings.json`. Every field has a
//! default, so a missing or partial file is fine. Command-line flags override
//! these for a single run.

use crate::cache::DEFAULT_TTL_SECS;
use crate::papers::{openalex, pubmed, DEFAULT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding cache.db (None = user cache dir)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_pubmed_url")]
    pub pubmed_base_url: String,
    #[serde(default = "default_openalex_url")]
    pub openalex_base_url: String,
    #[serde(default)]
    pub ncbi_api_key: Option<String>,
    /// Contact email for OpenAlex's polite pool
    #[serde(default)]
    pub openalex_mailto: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_pubmed_url() -> String {
    pubmed::DEFAULT_BASE_URL.to_string()
}

fn default_openalex_url() -> String {
    openalex::DEFAULT_BASE_URL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_enabled: true,
            cache_ttl_secs: DEFAULT_TTL_SECS, // 7 days
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            pubmed_base_url: default_pubmed_url(),
            openalex_base_url: default_openalex_url(),
            ncbi_api_key: None,
            openalex_mailto: None,
        }
    }
}

/// `<config dir>/uindex/settings.json`
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("uindex"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("settings.json")
}

impl Settings {
    /// Load settings from disk, falling back to defaults
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Settings::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "ignoring unreadable settings: {}", e);
                Settings::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to read settings: {}", e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    }

    /// NCBI key: environment variable first, then the stored setting
    pub fn ncbi_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var("NCBI_API_KEY") {
            if !key.is_empty() {
                return Some(key);
            }
        }
        self.ncbi_api_key.clone().filter(|k| !k.is_empty())
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(crate::cache::default_cache_dir)
            .join("cache.db")
    }
}
