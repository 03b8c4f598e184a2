use std::{
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use dashmap::DashMap;
use git2::{AutotagOption, Direction, FetchOptions, Repository};
use log::{debug, info, trace};
use thiserror::Error;

use crate::{
    flock::FileLock,
    git::repository::GitRepository,
    vcs::{RemoteRepository, VcsError, VersionControl},
};

const DEFAULT_URL_PREFIX: &str = "https://";
const REMOTE: &str = "origin";
const BRANCH_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";
const TAG_REFSPEC: &str = "+refs/tags/*:refs/tags/*";
pub(super) const REMOTE_HEAD: &str = "refs/remotes/origin/HEAD";

/// Bare clones of every repository ever vendored, one per address, reused
/// across runs.
pub struct GitCache {
    location: PathBuf,
    url_prefix: String,
    entries: DashMap<PathBuf, Arc<Mutex<()>>>,
    _lock: FileLock,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {location} does not exist")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired")]
    Lock(#[from] crate::flock::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl GitCache {
    pub fn new(location: PathBuf) -> Result<GitCache, CacheError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.display().to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&location)?;
        }

        let lock = Self::acquire_lock(&location)?;

        Ok(GitCache {
            location,
            url_prefix: DEFAULT_URL_PREFIX.to_owned(),
            entries: DashMap::new(),
            _lock: lock,
        })
    }

    /// Replaces the scheme prepended to addresses when building remote urls.
    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        if self.location.exists() {
            info!("Clearing repository cache {}", self.location.display());
            std::fs::remove_dir_all(&self.location)?;
        }
        Ok(())
    }

    fn acquire_lock(location: &Path) -> Result<FileLock, CacheError> {
        let location = location.join(".lock");
        debug!(
            "Acquiring a lock on the cache location: {}",
            location.display()
        );
        let lock = FileLock::new(&location)?;
        debug!("Acquired a lock on the cache location");
        Ok(lock)
    }

    fn open_entry(&self, path: &Path, url: &str) -> Result<Repository, VcsError> {
        trace!("Opening existing repository at {}", path.display());

        let repo = Repository::open_bare(path)?;
        {
            let remote = repo.find_remote(REMOTE)?;
            if remote.url() != Some(url) {
                trace!(
                    "Updating remote existing url {:?} to new url {}",
                    remote.url(),
                    url
                );
                repo.remote_set_url(REMOTE, url)?;
            }
        }
        Ok(repo)
    }

    fn create_entry(&self, path: &Path, url: &str) -> Result<Repository, VcsError> {
        trace!("Creating a new repository at {}", path.display());

        let repo = Repository::init_bare(path)?;
        repo.remote_with_fetch(REMOTE, url, BRANCH_REFSPEC)?;
        Ok(repo)
    }

    fn fetch(&self, repo: &Repository, url: &str) -> Result<(), VcsError> {
        let mut remote = repo.find_remote(REMOTE)?;

        let default_branch = {
            let connection = remote.connect_auth(Direction::Fetch, None, None)?;
            connection
                .default_branch()
                .ok()
                .and_then(|buf| buf.as_str().map(str::to_owned))
        };

        debug!("Fetching {}", url);
        let mut options = FetchOptions::new();
        options.download_tags(AutotagOption::None);
        remote.fetch(&[BRANCH_REFSPEC, TAG_REFSPEC], Some(&mut options), None)?;

        match default_branch.as_deref().and_then(|b| b.strip_prefix("refs/heads/")) {
            Some(branch) => {
                trace!("Default branch of {} is {}", url, branch);
                repo.reference_symbolic(
                    REMOTE_HEAD,
                    &format!("refs/remotes/{REMOTE}/{branch}"),
                    true,
                    "update remote HEAD",
                )?;
            }
            None => debug!("{} did not advertise a default branch", url),
        }
        Ok(())
    }
}

impl VersionControl for GitCache {
    fn clone_repository(&self, address: &str) -> Result<Box<dyn RemoteRepository>, VcsError> {
        let relative = Path::new(address.trim_start_matches('/'));
        if relative.as_os_str().is_empty()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(VcsError::InvalidAddress {
                address: address.to_owned(),
            });
        }
        let path = self.location.join(relative);
        let url = format!("{}{}", self.url_prefix, address);

        // Tasks vendoring the same repository share its cache entry
        let entry = Arc::clone(&self.entries.entry(path.clone()).or_default());
        let _guard = entry.lock().unwrap_or_else(PoisonError::into_inner);

        let repo = if path.exists() {
            self.open_entry(&path, &url)?
        } else {
            self.create_entry(&path, &url)?
        };
        self.fetch(&repo, &url)?;

        Ok(Box::new(GitRepository::new(repo, address)))
    }
}
