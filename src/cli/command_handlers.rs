use std::{path::Path, sync::Arc};

use log::info;

use crate::{
    git::GitCache,
    model::{ProjectConfig, ProjectError},
    status::LogReporter,
    store::{ConfigStore, StoreError},
    vcs::VersionControl,
};

/// Handler to sync command
pub async fn do_sync(
    vcs: Arc<dyn VersionControl>,
    root: &Path,
    config_file_name: &Path,
    force: bool,
) -> anyhow::Result<()> {
    let config_file_path = root.join(config_file_name);
    let mut store = open_store(vcs, root, ProjectConfig::from_file(&config_file_path)?);

    let result = store.sync_all(force).await;
    store.config().save(&config_file_path)?;
    result?;

    info!("All dependencies are up to date");
    Ok(())
}

/// Handler to add command
///
/// Creates the project document if there is none yet.
pub async fn do_add(
    vcs: Arc<dyn VersionControl>,
    root: &Path,
    config_file_name: &Path,
    url: &str,
    pick: &[String],
) -> anyhow::Result<String> {
    let config_file_path = root.join(config_file_name);
    let mut store = open_store(vcs, root, load_or_default(&config_file_path)?);

    let result = store.add(url, pick).await;
    if !matches!(result, Err(StoreError::Parse(_))) {
        store.config().save(&config_file_path)?;
    }
    Ok(result?)
}

/// Handler to remove command
pub fn do_remove(
    vcs: Arc<dyn VersionControl>,
    root: &Path,
    config_file_name: &Path,
    key: &str,
) -> anyhow::Result<()> {
    let config_file_path = root.join(config_file_name);
    let mut store = open_store(vcs, root, ProjectConfig::from_file(&config_file_path)?);

    store.remove(key)?;
    store.config().save(&config_file_path)?;
    Ok(())
}

/// Handler to update command
///
/// Without a key every dependency is refetched.
pub async fn do_update(
    vcs: Arc<dyn VersionControl>,
    root: &Path,
    config_file_name: &Path,
    key: Option<&str>,
) -> anyhow::Result<()> {
    let config_file_path = root.join(config_file_name);
    let mut store = open_store(vcs, root, ProjectConfig::from_file(&config_file_path)?);

    let result = match key {
        Some(key) => store.update(key).await,
        None => store.update_all().await,
    };
    store.config().save(&config_file_path)?;
    Ok(result?)
}

/// Handler to init command
pub fn do_init(root: &Path, config_file_name: &Path) -> anyhow::Result<()> {
    let config_file_path = root.join(config_file_name);
    if config_file_path.exists() {
        return Err(ProjectError::AlreadyExists {
            path: config_file_path.display().to_string(),
        }
        .into());
    }
    ProjectConfig::default().save(&config_file_path)?;
    info!("Created {}", config_file_path.display());
    Ok(())
}

pub fn do_clear_cache(cache: &GitCache) -> anyhow::Result<()> {
    cache.clear()?;
    Ok(())
}

fn open_store(vcs: Arc<dyn VersionControl>, root: &Path, config: ProjectConfig) -> ConfigStore {
    ConfigStore::new(config, root, vcs, Arc::new(LogReporter))
}

fn load_or_default(path: &Path) -> Result<ProjectConfig, ProjectError> {
    match ProjectConfig::from_file(path) {
        Err(ProjectError::NotFound { .. }) => Ok(ProjectConfig::default()),
        otherwise => otherwise,
    }
}
