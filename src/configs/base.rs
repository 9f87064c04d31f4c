use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;
use crate::configs::*;

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct Config {
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub relay: Option<RelayConfig>,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    pub fn load() -> AnyResult<Self> {
        let config_path = if Path::new("config.toml").exists() {
            "config.toml"
        } else if Path::new("config.default.toml").exists() {
            "config.default.toml"
        } else {
            return Err("config.toml or config.default.toml not found".into());
        };

        Self::load_from(config_path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> AnyResult<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)?;
        if config_str.trim().is_empty() {
            return Err(format!("{} is empty", path.display()).into());
        }

        Self::from_toml(&config_str)
    }

    pub fn from_toml(s: &str) -> AnyResult<Self> {
        Ok(toml::from_str(s)?)
    }
}
