use std::{path::PathBuf, sync::Arc};

use crate::{
    cli::command_handlers::{do_add, do_clear_cache, do_init, do_remove, do_sync, do_update},
    git::GitCache,
};

mod builder;

pub use builder::{GitvendBuilder, DEFAULT_CONFIG_FILE_NAME};

pub struct Gitvend {
    cache: Arc<GitCache>,
    root: PathBuf,
    config_file_name: PathBuf,
}

impl Gitvend {
    pub fn builder() -> GitvendBuilder {
        GitvendBuilder::default()
    }

    /// Writes an empty project document
    pub fn init(&self) -> anyhow::Result<()> {
        do_init(&self.root, &self.config_file_name)
    }

    /// Brings every declared dependency in line with the document.
    /// With `force`, refetches even those that are up to date.
    pub async fn sync(&self, force: bool) -> anyhow::Result<()> {
        do_sync(self.cache.clone(), &self.root, &self.config_file_name, force).await
    }

    /// Declares and vendors a new dependency, returning its key
    pub async fn add(&self, url: &str, pick: &[String]) -> anyhow::Result<String> {
        do_add(self.cache.clone(), &self.root, &self.config_file_name, url, pick).await
    }

    /// Forgets a dependency and deletes its vendored files
    pub fn remove(&self, key: &str) -> anyhow::Result<()> {
        do_remove(self.cache.clone(), &self.root, &self.config_file_name, key)
    }

    /// Refetches one dependency, or all of them
    pub async fn update(&self, key: Option<&str>) -> anyhow::Result<()> {
        do_update(self.cache.clone(), &self.root, &self.config_file_name, key).await
    }

    pub fn clear_cache(&self) -> anyhow::Result<()> {
        do_clear_cache(&self.cache)
    }
}
