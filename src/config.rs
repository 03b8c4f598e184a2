//! Settings taken from the environment. `GITVEND_CACHE_DIR` moves the
//! repository cache and `GITVEND_PROJECT_FILE` renames the project document.
//! Command line flags take precedence over both.

use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

const ENV_PREFIX: &str = "GITVEND";

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
pub struct GitvendConfig {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub project: ProjectSettings,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
pub struct CacheSettings {
    pub dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
pub struct ProjectSettings {
    /// Name of the project document, relative to the project root
    pub file: Option<PathBuf>,
}

impl GitvendConfig {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self::from_env(None)?)
    }

    /// Reads the process environment, or `env` instead when given.
    fn from_env(env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
