use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedvault")
        .join("feeds.db")
        .to_string_lossy()
        .to_string()
}

fn default_user_agent() -> String {
    format!("feedvault/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_concurrent_fetches() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feedvault")
            .join("config.toml")
    }

    /// Override the database location, e.g. from `--db`.
    pub fn with_db_path(mut self, db_path: Option<String>) -> Self {
        if let Some(path) = db_path.filter(|p| !p.trim().is_empty()) {
            self.db_path = path;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(AppError::Config("db_path must not be empty".to_string()));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(AppError::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
