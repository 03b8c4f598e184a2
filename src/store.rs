use std::{
    fmt::{self, Display},
    path::Path,
    sync::Arc,
};

use log::{debug, info};
use thiserror::Error;

use crate::{
    materialize::{self, MaterializeError},
    model::{DependencySpec, ParseError, ProjectConfig, ProjectError},
    status::StatusReporter,
    sync::{DependencyError, SyncContext, SyncJob, SyncOrchestrator, SyncOutcome},
    vcs::VersionControl,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Dependency {key} is not declared")]
    DependencyNotFound { key: String },
    #[error(transparent)]
    Filesystem(#[from] MaterializeError),
    #[error("{0}")]
    SyncFailed(SyncFailures),
}

/// Every dependency that failed during one synchronization, sorted by key.
#[derive(Debug)]
pub struct SyncFailures {
    pub failures: Vec<(String, DependencyError)>,
}

impl SyncFailures {
    pub fn keys(&self) -> Vec<&str> {
        self.failures.iter().map(|(key, _)| key.as_str()).collect()
    }
}

impl Display for SyncFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} dependencies failed to synchronize", self.failures.len())?;
        for (key, error) in &self.failures {
            write!(f, "\n  {key}: {error}")?;
        }
        Ok(())
    }
}

/// Owns the declared dependencies and their locks, and keeps the destination
/// directory in line with them.
pub struct ConfigStore {
    config: ProjectConfig,
    orchestrator: SyncOrchestrator,
}

impl ConfigStore {
    /// `root` is the directory the document's destination is relative to.
    pub fn new(
        config: ProjectConfig,
        root: &Path,
        vcs: Arc<dyn VersionControl>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        let destination = root.join(&config.destination);
        ConfigStore {
            config,
            orchestrator: SyncOrchestrator::new(SyncContext::new(destination, vcs, reporter)),
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn into_config(self) -> ProjectConfig {
        self.config
    }

    fn destination(&self) -> &Path {
        &self.orchestrator.context().destination
    }

    /// Declares a new dependency and synchronizes it. Returns its key.
    ///
    /// The declaration is kept even if synchronization fails, so a later
    /// sync can retry it.
    pub async fn add<S: AsRef<str>>(&mut self, url: &str, pick: &[S]) -> Result<String, StoreError> {
        let spec = DependencySpec::parse(url)?.with_pick(pick)?;
        let key = spec.key();
        info!("Adding {}", key);
        self.config.dependencies.insert(key.clone(), spec);
        self.sync_keys(vec![key.clone()], false).await?;
        Ok(key)
    }

    /// Forgets a dependency and deletes everything it materialized.
    pub fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let lock = self.config.dependency_locks.get(key);
        let desired = self.config.dependencies.get(key);
        let Some(found) = lock.or(desired) else {
            return Err(StoreError::DependencyNotFound {
                key: key.to_owned(),
            });
        };

        materialize::clear(self.destination(), found)?;
        if let Some(desired) = desired {
            materialize::clear(self.destination(), desired)?;
        }

        self.config.dependency_locks.remove(key);
        self.config.dependencies.remove(key);
        info!("Removed {}", key);
        Ok(())
    }

    /// Refetches one declared dependency regardless of its state on disk.
    pub async fn update(&mut self, key: &str) -> Result<(), StoreError> {
        if !self.config.dependencies.contains_key(key) {
            return Err(StoreError::DependencyNotFound {
                key: key.to_owned(),
            });
        }
        self.sync_keys(vec![key.to_owned()], true).await
    }

    pub async fn update_all(&mut self) -> Result<(), StoreError> {
        self.sync_all(true).await
    }

    /// Synchronizes every declared dependency. Dependencies that succeed get
    /// their lock recorded even when others fail.
    pub async fn sync_all(&mut self, force: bool) -> Result<(), StoreError> {
        let keys = self.config.dependencies.keys().cloned().collect();
        self.sync_keys(keys, force).await
    }

    async fn sync_keys(&mut self, keys: Vec<String>, force: bool) -> Result<(), StoreError> {
        let jobs = keys
            .into_iter()
            .filter_map(|key| {
                let spec = self.config.dependencies.get(&key)?.clone();
                let lock = self.config.dependency_locks.get(&key).cloned();
                Some(SyncJob {
                    key,
                    spec,
                    lock,
                    force,
                })
            })
            .collect::<Vec<_>>();
        debug!("Synchronizing {} dependencies", jobs.len());

        let results = self.orchestrator.run(jobs).await;
        self.apply(results)
    }

    fn apply(
        &mut self,
        results: Vec<(String, Result<SyncOutcome, DependencyError>)>,
    ) -> Result<(), StoreError> {
        let mut failures = Vec::new();
        for (key, result) in results {
            match result {
                Ok(SyncOutcome::UpToDate) => {}
                Ok(SyncOutcome::Locked(lock)) => {
                    self.config.dependency_locks.insert(key, lock);
                }
                Err(error) => failures.push((key, error)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort_by(|(a, _), (b, _)| a.cmp(b));
            Err(StoreError::SyncFailed(SyncFailures { failures }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::{
        model::Selector,
        status::{recording::RecordingReporter, Phase},
        vcs::fake::{files, FakeRepository, FakeVcs, Files},
    };

    use pretty_assertions::assert_eq;

    const NO_PICK: &[&str] = &[];

    fn vcs() -> Arc<FakeVcs> {
        Arc::new(
            FakeVcs::default()
                .with_repository(
                    "github.com/org/lib",
                    FakeRepository::new("c0ffee", files([("src/lib.rs", "head")]))
                        .with_tag("v1.0.0", files([("src/lib.rs", "one"), ("README", "r")]))
                        .with_tag("v1.2.0", files([("src/lib.rs", "two"), ("README", "r")])),
                )
                .with_repository(
                    "github.com/org/tool",
                    FakeRepository::new("0ddba11", files([("tool.sh", "echo")]))
                        .with_branch("main", files([("tool.sh", "echo main")])),
                )
                .with_repository(
                    "gitlab.com/team/data",
                    FakeRepository::new("deadbeef", files([("data.csv", "a,b")])),
                )
                .with_repository(
                    "github.com/a/src",
                    FakeRepository::new("a0", Files::new())
                        .with_branch("main", files([("lib/x.rs", "x")])),
                )
                .with_repository(
                    "github.com/b/other",
                    FakeRepository::new("b0", Files::new())
                        .with_branch("main", files([("src/y.rs", "y")])),
                ),
        )
    }

    struct Fixture {
        root: tempfile::TempDir,
        vcs: Arc<FakeVcs>,
        reporter: Arc<RecordingReporter>,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                root: tempfile::tempdir().unwrap(),
                vcs: vcs(),
                reporter: Arc::new(RecordingReporter::default()),
            }
        }

        fn store(&self, config: ProjectConfig) -> ConfigStore {
            ConfigStore::new(
                config,
                self.root.path(),
                self.vcs.clone(),
                self.reporter.clone(),
            )
        }

        fn vendored(&self, path: &str) -> PathBuf {
            self.root.path().join("vnd").join(path)
        }
    }

    #[tokio::test]
    async fn add_resolves_latest_tag() {
        let fixture = Fixture::new();
        let mut store = fixture.store(ProjectConfig::default());

        let key = store.add("github.com/org/lib", &["src"]).await.unwrap();
        assert_eq!(key, "github.com/org/lib");

        let config = store.into_config();
        assert_eq!(config.dependencies[&key].selector, Selector::Unset);
        let lock = &config.dependency_locks[&key];
        assert_eq!(lock.selector, Selector::Tag("v1.2.0".to_owned()));
        assert_eq!(lock.pick, vec!["src".to_owned()]);
        assert_eq!(
            std::fs::read_to_string(fixture.vendored("src/lib.rs")).unwrap(),
            "two"
        );
        assert!(!fixture.vendored("README").exists());
    }

    #[tokio::test]
    async fn add_rejects_invalid_url() {
        let fixture = Fixture::new();
        let mut store = fixture.store(ProjectConfig::default());

        assert!(matches!(
            store.add("https://github.com/org/lib", NO_PICK).await,
            Err(StoreError::Parse(ParseError::InvalidDependencyUrl { .. }))
        ));
        assert!(store.config().dependencies.is_empty());
        assert_eq!(fixture.vcs.clones(), 0);
    }

    #[tokio::test]
    async fn failed_add_keeps_declaration() {
        let fixture = Fixture::new();
        fixture.vcs.set_unreachable("github.com/org/tool");
        let mut store = fixture.store(ProjectConfig::default());

        assert!(matches!(
            store.add("github.com/org/tool#main", NO_PICK).await,
            Err(StoreError::SyncFailed(_))
        ));
        assert!(store
            .config()
            .dependencies
            .contains_key("github.com/org/tool#main"));
        assert!(store.config().dependency_locks.is_empty());
    }

    #[tokio::test]
    async fn add_rejects_address_leaving_destination() {
        let fixture = Fixture::new();
        let precious = fixture.root.path().join("precious.txt");
        std::fs::write(&precious, "keep me").unwrap();
        let mut store = fixture.store(ProjectConfig::default());

        for url in ["github.com/org/lib/..", "github.com/org/.", "github.com/../.."] {
            assert!(
                matches!(
                    store.add(url, NO_PICK).await,
                    Err(StoreError::Parse(ParseError::InvalidDependencyUrl { .. }))
                ),
                "{url} should be rejected"
            );
        }
        assert!(precious.exists());
        assert!(store.config().dependencies.is_empty());
        assert_eq!(fixture.vcs.clones(), 0);
    }

    #[tokio::test]
    async fn picked_dependency_keeps_directory_named_after_it() {
        let fixture = Fixture::new();
        let mut store = fixture.store(ProjectConfig::default());
        store.add("github.com/b/other#main", &["src"]).await.unwrap();
        store.add("github.com/a/src#main", &["lib"]).await.unwrap();

        assert!(fixture.vendored("src/y.rs").is_file());
        assert!(fixture.vendored("lib/x.rs").is_file());

        store.sync_all(false).await.unwrap();
        assert_eq!(fixture.vcs.clones(), 2);

        store.remove("github.com/a/src#main").unwrap();
        assert!(!fixture.vendored("lib").exists());
        assert!(fixture.vendored("src/y.rs").is_file());

        store.sync_all(false).await.unwrap();
        assert_eq!(fixture.vcs.clones(), 2);
    }

    #[tokio::test]
    async fn second_sync_is_a_no_op() {
        let fixture = Fixture::new();
        let mut store = fixture.store(ProjectConfig::default());
        store.add("github.com/org/lib@v1.0.0", NO_PICK).await.unwrap();
        store.add("github.com/org/tool#main", NO_PICK).await.unwrap();
        assert_eq!(fixture.vcs.clones(), 2);

        let vendored = fixture.vendored("lib/src/lib.rs");
        let modified = std::fs::metadata(&vendored).unwrap().modified().unwrap();
        let locks = store.config().dependency_locks.clone();

        store.sync_all(false).await.unwrap();

        assert_eq!(fixture.vcs.clones(), 2);
        assert_eq!(
            std::fs::metadata(&vendored).unwrap().modified().unwrap(),
            modified
        );
        assert_eq!(store.config().dependency_locks, locks);
    }

    #[tokio::test]
    async fn sync_repairs_edited_files() {
        let fixture = Fixture::new();
        let mut store = fixture.store(ProjectConfig::default());
        store.add("github.com/org/lib@v1.0.0", NO_PICK).await.unwrap();

        let vendored = fixture.vendored("lib/src/lib.rs");
        std::fs::write(&vendored, "local edit").unwrap();
        store.sync_all(false).await.unwrap();

        assert_eq!(fixture.vcs.clones(), 2);
        assert_eq!(std::fs::read_to_string(vendored).unwrap(), "one");
    }

    #[tokio::test]
    async fn update_forces_refetch() {
        let fixture = Fixture::new();
        let mut store = fixture.store(ProjectConfig::default());
        store.add("github.com/org/tool#main", NO_PICK).await.unwrap();

        store.update("github.com/org/tool#main").await.unwrap();
        assert_eq!(fixture.vcs.clones(), 2);

        store.update_all().await.unwrap();
        assert_eq!(fixture.vcs.clones(), 3);

        assert!(matches!(
            store.update("github.com/org/tool").await,
            Err(StoreError::DependencyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn remove_unknown_key_leaves_state_unchanged() {
        let fixture = Fixture::new();
        let mut store = fixture.store(ProjectConfig::default());
        store.add("github.com/org/lib@v1.0.0", NO_PICK).await.unwrap();
        let before = store.config().clone();

        assert!(matches!(
            store.remove("github.com/org/lib"),
            Err(StoreError::DependencyNotFound { key }) if key == "github.com/org/lib"
        ));
        assert_eq!(store.config(), &before);
        assert!(fixture.vendored("lib/src/lib.rs").exists());
    }

    #[tokio::test]
    async fn remove_deletes_entries_and_files() {
        let fixture = Fixture::new();
        let mut store = fixture.store(ProjectConfig::default());
        store.add("github.com/org/lib@v1.0.0", &["src"]).await.unwrap();
        store.add("github.com/org/tool#main", NO_PICK).await.unwrap();

        store.remove("github.com/org/lib@v1.0.0").unwrap();

        assert!(!fixture.vendored("src").exists());
        assert!(fixture.vendored("tool/tool.sh").exists());
        let config = store.into_config();
        assert!(!config.dependencies.contains_key("github.com/org/lib@v1.0.0"));
        assert!(!config
            .dependency_locks
            .contains_key("github.com/org/lib@v1.0.0"));
        assert_eq!(config.dependencies.len(), 1);
    }

    #[tokio::test]
    async fn remove_prunes_orphaned_lock() {
        let fixture = Fixture::new();
        let mut config = ProjectConfig::default();
        let lock = DependencySpec::parse("gitlab.com/team/data!deadbeef").unwrap();
        config.dependency_locks.insert(lock.key(), lock);
        let mut store = fixture.store(config);

        store.remove("gitlab.com/team/data!deadbeef").unwrap();
        assert!(store.config().dependency_locks.is_empty());
    }

    #[tokio::test]
    async fn partial_failure_commits_successful_locks() {
        let fixture = Fixture::new();
        let mut store = fixture.store(ProjectConfig::default());
        store.add("github.com/org/lib@v1.0.0", NO_PICK).await.unwrap();
        store.add("github.com/org/tool#main", NO_PICK).await.unwrap();
        store.add("gitlab.com/team/data", NO_PICK).await.unwrap();
        let tool_lock = store.config().dependency_locks["github.com/org/tool#main"].clone();

        fixture.vcs.set_unreachable("github.com/org/tool");
        fixture.reporter.clear();
        let error = store.update_all().await.unwrap_err();

        let StoreError::SyncFailed(failures) = &error else {
            panic!("unexpected error {error}");
        };
        assert_eq!(failures.keys(), vec!["github.com/org/tool#main"]);
        assert!(error.to_string().contains("github.com/org/tool#main"));
        assert!(!error.to_string().contains("gitlab.com/team/data"));

        let config = store.config();
        assert_eq!(config.dependency_locks.len(), 3);
        assert_eq!(
            config.dependency_locks["github.com/org/tool#main"],
            tool_lock
        );
        assert_eq!(
            fixture.reporter.phases("github.com/org/tool#main").last(),
            Some(&Phase::Error)
        );
        assert_eq!(
            fixture.reporter.phases("gitlab.com/team/data").last(),
            Some(&Phase::Ok)
        );
    }

    #[tokio::test]
    async fn failures_are_sorted_by_key() {
        let fixture = Fixture::new();
        fixture.vcs.set_unreachable("github.com/org/tool");
        fixture.vcs.set_unreachable("gitlab.com/team/data");
        fixture.vcs.set_unreachable("github.com/org/lib");

        let mut config = ProjectConfig::default();
        for url in [
            "gitlab.com/team/data",
            "github.com/org/tool#main",
            "github.com/org/lib",
        ] {
            let spec = DependencySpec::parse(url).unwrap();
            config.dependencies.insert(spec.key(), spec);
        }
        let mut store = fixture.store(config);

        let Err(StoreError::SyncFailed(failures)) = store.sync_all(false).await else {
            panic!("expected the sync to fail");
        };
        assert_eq!(
            failures.keys(),
            vec![
                "github.com/org/lib",
                "github.com/org/tool#main",
                "gitlab.com/team/data"
            ]
        );
    }
}
