//! Secret retrieval from the environment and `.env` files.
//!
//! Secrets never live in `shoebox.toml`; they come from the process
//! environment, optionally seeded from a `.env` file.

use anyhow::Result;
use std::env;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const NOTION_API_KEY_ENV: &str = "NOTION_API_KEY";
pub const SLACK_BOT_TOKEN_ENV: &str = "SLACK_BOT_TOKEN";
pub const SLACK_SIGNING_SECRET_ENV: &str = "SLACK_SIGNING_SECRET";

#[derive(Clone)]
pub struct Secrets {
    pub openai_api_key: String,
    pub notion_api_key: String,
    pub slack_bot_token: String,
    pub slack_signing_secret: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            openai_api_key: require(OPENAI_API_KEY_ENV)?,
            notion_api_key: require(NOTION_API_KEY_ENV)?,
            slack_bot_token: require(SLACK_BOT_TOKEN_ENV)?,
            slack_signing_secret: require(SLACK_SIGNING_SECRET_ENV)?,
        })
    }
}

fn require(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(anyhow::anyhow!(
            "missing required environment variable {name} (set it or add it to .env)"
        )),
    }
}

/// Load a `.env` file if one exists. A missing file is fine; anything else
/// is reported but not fatal.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded environment from .env");
        }
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(error = %err, "failed to load .env file");
        }
    }
}
