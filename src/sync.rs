use std::{path::PathBuf, sync::Arc};

use log::{debug, info};
use thiserror::Error;

use crate::{
    materialize::{self, MaterializeError},
    model::{DependencySpec, Selector},
    resolver,
    status::{Phase, StatusEvent, StatusReporter},
    vcs::{VcsError, VersionControl},
};

#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("Could not pick a version of {address}: {source}")]
    TagResolutionFailed { address: String, source: VcsError },
    #[error("Could not clone {address}: {source}")]
    CloneFailed { address: String, source: VcsError },
    #[error("Could not check out {selector} of {address}: {source}")]
    CheckoutFailed {
        address: String,
        selector: Selector,
        source: VcsError,
    },
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] MaterializeError),
    #[error("Synchronization task did not complete: {0}")]
    Aborted(String),
}

/// Everything a synchronization needs, built once per invocation.
pub struct SyncContext {
    pub destination: PathBuf,
    pub vcs: Arc<dyn VersionControl>,
    pub reporter: Arc<dyn StatusReporter>,
}

impl SyncContext {
    pub fn new(
        destination: impl Into<PathBuf>,
        vcs: Arc<dyn VersionControl>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        SyncContext {
            destination: destination.into(),
            vcs,
            reporter,
        }
    }

    fn report(&self, key: &str, phase: Phase, detail: impl Into<String>) {
        self.reporter.report(StatusEvent::new(key, phase, detail));
    }
}

/// One dependency to bring in line with its declaration.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub key: String,
    pub spec: DependencySpec,
    pub lock: Option<DependencySpec>,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    UpToDate,
    /// Freshly materialized, with the resolved selector and checksum filled in.
    Locked(DependencySpec),
}

pub type SyncResult = Result<SyncOutcome, DependencyError>;

pub struct SyncOrchestrator {
    context: Arc<SyncContext>,
}

impl SyncOrchestrator {
    pub fn new(context: SyncContext) -> Self {
        SyncOrchestrator {
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// Synchronizes every job on its own blocking task and waits for all of
    /// them. There is no cap on how many run at once. One job failing does
    /// not affect the others; results come back in job order.
    pub async fn run(&self, jobs: Vec<SyncJob>) -> Vec<(String, SyncResult)> {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let key = job.key.clone();
                self.context.report(&key, Phase::Queued, "");
                let context = Arc::clone(&self.context);
                let handle = tokio::task::spawn_blocking(move || sync_dependency(&context, job));
                (key, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (key, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|error| Err(DependencyError::Aborted(error.to_string())));
            match &result {
                Ok(SyncOutcome::UpToDate) => self.context.report(&key, Phase::Ok, "up to date"),
                Ok(SyncOutcome::Locked(lock)) => {
                    self.context.report(&key, Phase::Ok, lock.selector.to_string())
                }
                Err(error) => self.context.report(&key, Phase::Error, error.to_string()),
            }
            results.push((key, result));
        }
        results
    }
}

/// Runs the pipeline of a single dependency: evaluate, and if stale remove
/// what was there, fetch, materialize and produce the new lock.
pub fn sync_dependency(context: &SyncContext, job: SyncJob) -> SyncResult {
    let SyncJob {
        key,
        mut spec,
        lock,
        force,
    } = job;
    let destination = &context.destination;

    if !spec.requires_update(lock.as_ref(), destination, force) {
        debug!("{} is up to date", key);
        return Ok(SyncOutcome::UpToDate);
    }

    if let Some(lock) = &lock {
        for path in lock.artifact_paths(destination) {
            materialize::remove_path(&path)?;
        }
    }
    for path in spec.artifact_paths(destination) {
        materialize::remove_path(&path)?;
    }

    context.report(&key, Phase::Fetching, spec.address.as_str());
    let repository =
        context
            .vcs
            .clone_repository(&spec.address)
            .map_err(|source| DependencyError::CloneFailed {
                address: spec.address.clone(),
                source,
            })?;

    if spec.selector.is_unset() {
        context.report(&key, Phase::Resolving, "latest version");
        spec.selector = resolver::latest_semver_tag_or_head(repository.as_ref()).map_err(
            |source| DependencyError::TagResolutionFailed {
                address: spec.address.clone(),
                source,
            },
        )?;
        info!("Pinned {} to {}", key, spec.selector);
    }

    let tree = repository
        .checkout(&spec.selector)
        .map_err(|source| DependencyError::CheckoutFailed {
            address: spec.address.clone(),
            selector: spec.selector.clone(),
            source,
        })?;

    context.report(&key, Phase::Saving, destination.display().to_string());
    let checksum = materialize::materialize(tree.as_ref(), destination, &spec)?;
    spec.checksum = Some(checksum);

    Ok(SyncOutcome::Locked(spec))
}
