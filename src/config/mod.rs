//! Configuration management for foodome
//!
//! Page ranges, catalog URLs and crawl limits are configuration constants
//! loaded from a TOML file; a missing file means all defaults.

mod defaults;

pub use defaults::*;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Crawl limits shared by both sources
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// FooDB catalog configuration (source A)
    #[serde(default)]
    pub foodb: FoodbConfig,

    /// HMDB catalog configuration (source B)
    #[serde(default)]
    pub hmdb: HmdbConfig,

    /// FooDB food listing configuration (the --repopulate-foods import)
    #[serde(default)]
    pub foods: FoodCatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Maximum entity ingestions in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodbConfig {
    /// Listing page URL prefix; the page number is appended
    #[serde(default = "default_foodb_catalog_url")]
    pub catalog_url: String,

    /// Detail page URL prefix; the FooDB id is appended
    #[serde(default = "default_foodb_detail_url")]
    pub detail_url: String,

    #[serde(default = "default_foodb_start_page")]
    pub start_page: u32,

    #[serde(default = "default_foodb_end_page")]
    pub end_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HmdbConfig {
    #[serde(default = "default_hmdb_catalog_url")]
    pub catalog_url: String,

    /// Detail page URL prefix; "<id>.xml" is appended
    #[serde(default = "default_hmdb_detail_url")]
    pub detail_url: String,

    #[serde(default = "default_hmdb_start_page")]
    pub start_page: u32,

    #[serde(default = "default_hmdb_end_page")]
    pub end_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodCatalogConfig {
    #[serde(default = "default_food_catalog_url")]
    pub catalog_url: String,

    #[serde(default = "default_food_catalog_pages")]
    pub pages: u32,

    /// Where the crawled category -> foods map is snapshotted as JSON
    #[serde(default = "default_food_map_snapshot")]
    pub snapshot_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FoodbConfig {
    fn default() -> Self {
        Self {
            catalog_url: default_foodb_catalog_url(),
            detail_url: default_foodb_detail_url(),
            start_page: default_foodb_start_page(),
            end_page: default_foodb_end_page(),
        }
    }
}

impl Default for HmdbConfig {
    fn default() -> Self {
        Self {
            catalog_url: default_hmdb_catalog_url(),
            detail_url: default_hmdb_detail_url(),
            start_page: default_hmdb_start_page(),
            end_page: default_hmdb_end_page(),
        }
    }
}

impl Default for FoodCatalogConfig {
    fn default() -> Self {
        Self {
            catalog_url: default_food_catalog_url(),
            pages: default_food_catalog_pages(),
            snapshot_path: default_food_map_snapshot(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("foodome.toml")
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from the given (or default) path, falling back to defaults when
    /// the file does not exist
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_config_path);
        if config_path.exists() {
            Config::load(&config_path)
        } else {
            debug!(
                "Config file {} not found, using defaults",
                config_path.display()
            );
            Ok(Config::default())
        }
    }
}
