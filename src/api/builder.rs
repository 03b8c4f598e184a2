use std::{env, path::PathBuf, sync::Arc};

use anyhow::anyhow;
use home::home_dir;

use crate::{git::GitCache, Gitvend};

pub const DEFAULT_CONFIG_FILE_NAME: &str = "gitvend.toml";

#[derive(Default)]
pub struct GitvendBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    config_file_name: Option<PathBuf>,
    cache_directory_path: Option<PathBuf>,
}

impl GitvendBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the project document.
    ///
    /// Defaults to `gitvend.toml`.
    pub fn config_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file_name = Some(path.into());
        self
    }

    /// Location of the repository cache.
    ///
    /// Defaults to `$HOME/.gitvend/cache`.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    pub fn try_build(self) -> anyhow::Result<Gitvend> {
        let Self {
            root,
            config_file_name,
            cache_directory_path,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let config_file_name =
            config_file_name.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE_NAME));

        let cache_directory = match cache_directory_path {
            Some(path) => root.join(path),
            None => default_cache_directory()?,
        };

        let cache = GitCache::new(cache_directory)?;

        Ok(Gitvend {
            cache: Arc::new(cache),
            root,
            config_file_name,
        })
    }
}

fn default_cache_directory() -> anyhow::Result<PathBuf> {
    let mut cache_directory = home_dir()
        .ok_or_else(|| anyhow!("Could not find home dir. Please define $HOME env variable."))?;
    cache_directory.push(".gitvend/cache");
    Ok(cache_directory)
}
