//! Configuration loader and validator for the lab board console.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub backend: Backend,
    pub board: Board,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Backend {
    pub base_url: String,
}

/// Board behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Board {
    pub auto_refresh: bool,
    pub auto_refresh_seconds: u64,
    pub real_time: bool,
    pub default_purpose: String,
}

impl Config {
    /// The validated backend base URL.
    pub fn backend_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.backend.base_url)
            .map_err(|_| ConfigError::Invalid("backend.base_url must be a valid URL"))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.backend.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("backend.base_url must be non-empty"));
    }
    cfg.backend_url()?;
    if cfg.board.auto_refresh_seconds == 0 {
        return Err(ConfigError::Invalid(
            "board.auto_refresh_seconds must be > 0",
        ));
    }
    if cfg.board.default_purpose.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "board.default_purpose must be non-empty",
        ));
    }
    Ok(())
}

/// Returns the reference example YAML content.
pub fn example() -> &'static str {
    r#"backend:
  base_url: "http://localhost:5000/api/"

board:
  auto_refresh: true
  auto_refresh_seconds: 30
  real_time: false
  default_purpose: "Lab practice"
"#
}
