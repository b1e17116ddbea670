//! Configuration: `shoebox.toml` for layout, environment for secrets.

pub mod constants;
pub mod secrets;

use crate::store::schema::Category;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use secrets::{load_dotenv, Secrets};

pub const CONFIG_FILE: &str = "shoebox.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShoeboxConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub digest: DigestConfig,
}

impl ShoeboxConfig {
    /// Load from an explicit path, or `shoebox.toml` in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config in {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Per-category collection ids plus the audit log collection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    pub person_database_id: String,
    pub project_database_id: String,
    pub idea_database_id: String,
    pub admin_database_id: String,
    pub audit_database_id: String,
}

impl StoreConfig {
    pub fn database_id(&self, category: Category) -> &str {
        match category {
            Category::Person => &self.person_database_id,
            Category::Project => &self.project_database_id,
            Category::Idea => &self.idea_database_id,
            Category::Admin => &self.admin_database_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextConfig {
    /// Where the thread-context snapshot lives.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    /// Contexts idle longer than this are swept.
    #[serde(default = "default_sweep_max_age_days")]
    pub sweep_max_age_days: i64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            sweep_max_age_days: default_sweep_max_age_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DigestConfig {
    /// Channel the daily/weekly digests post to; digests are disabled when
    /// unset.
    pub channel: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_model() -> String {
    constants::llm::DEFAULT_MODEL.to_string()
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("shoebox-contexts.json")
}

fn default_sweep_max_age_days() -> i64 {
    constants::DEFAULT_SWEEP_MAX_AGE_DAYS
}
