//! Server configuration, loaded from a YAML file and overridden by CLI
//! flags.
//!
//! ```yaml
//! addr: 0.0.0.0:3000
//! db:
//!   url: sqlite://data.db?mode=rwc
//! auth:
//!   enabled: true
//!   secret: change-me
//! prefix: /admin
//! cors:
//!   enabled: true
//!   origins: ["https://example.com"]
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub addr: String,
    pub db: DbConfig,
    pub auth: AuthConfig,
    pub prefix: String,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub enabled: bool,
    pub secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

impl Config {
    /// Loads the config file when given, otherwise starts from defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config: Self = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        if config.addr.is_empty() {
            config.addr = DEFAULT_ADDR.to_string();
        }
        Ok(config)
    }
}
