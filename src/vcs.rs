//! Version control capability consumed by the synchronization engine.
//!
//! The engine never talks to git directly: it clones through a
//! [`VersionControl`] provider, inspects the resulting [`RemoteRepository`]
//! and reads files from a checked-out [`SourceTree`].

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::Selector;

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Address {address} does not name a repository")]
    InvalidAddress { address: String },
    #[error("Could not determine the head commit of {address}")]
    MissingHead { address: String },
    #[error("Selector must be resolved before checkout")]
    UnresolvedSelector,
    #[error("Reference {reference} was not found")]
    ReferenceNotFound { reference: String },
    #[error("Path {path} was not found in the tree")]
    PathNotFound { path: String },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

pub trait VersionControl: Send + Sync {
    /// Clones, or updates an existing copy of, the repository at `address`.
    fn clone_repository(&self, address: &str) -> Result<Box<dyn RemoteRepository>, VcsError>;
}

pub trait RemoteRepository {
    fn list_tags(&self) -> Result<Vec<String>, VcsError>;

    fn head_hash(&self) -> Result<String, VcsError>;

    fn checkout(&self, selector: &Selector) -> Result<Box<dyn SourceTree + '_>, VcsError>;
}

pub trait SourceTree {
    /// Paths of all regular files in the tree, relative to its root.
    fn files(&self) -> Result<Vec<PathBuf>, VcsError>;

    fn read(&self, path: &Path) -> Result<Vec<u8>, VcsError>;
}

#[cfg(test)]
pub(crate) mod fake {
    use std::{
        collections::{BTreeMap, HashMap, HashSet},
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use super::*;

    pub type Files = BTreeMap<PathBuf, Vec<u8>>;

    pub fn files<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Files {
        entries
            .into_iter()
            .map(|(path, content)| (PathBuf::from(path), content.as_bytes().to_vec()))
            .collect()
    }

    /// An in-memory repository: named refs pointing at file trees.
    #[derive(Clone, Debug, Default)]
    pub struct FakeRepository {
        head: String,
        tags: Vec<String>,
        refs: HashMap<String, Files>,
    }

    impl FakeRepository {
        pub fn new(head: &str, head_files: Files) -> Self {
            FakeRepository {
                head: head.to_owned(),
                tags: Vec::new(),
                refs: HashMap::from([(head.to_owned(), head_files)]),
            }
        }

        pub fn with_tag(mut self, tag: &str, files: Files) -> Self {
            self.tags.push(tag.to_owned());
            self.refs.insert(tag.to_owned(), files);
            self
        }

        pub fn with_branch(mut self, branch: &str, files: Files) -> Self {
            self.refs.insert(branch.to_owned(), files);
            self
        }
    }

    impl RemoteRepository for FakeRepository {
        fn list_tags(&self) -> Result<Vec<String>, VcsError> {
            Ok(self.tags.clone())
        }

        fn head_hash(&self) -> Result<String, VcsError> {
            Ok(self.head.clone())
        }

        fn checkout(&self, selector: &Selector) -> Result<Box<dyn SourceTree + '_>, VcsError> {
            let reference = match selector {
                Selector::Tag(name) | Selector::Branch(name) | Selector::Hash(name) => name,
                Selector::Unset => return Err(VcsError::UnresolvedSelector),
            };
            self.refs
                .get(reference)
                .map(|files| Box::new(FakeTree(files)) as Box<dyn SourceTree + '_>)
                .ok_or_else(|| VcsError::ReferenceNotFound {
                    reference: reference.clone(),
                })
        }
    }

    pub struct FakeTree<'a>(&'a Files);

    impl SourceTree for FakeTree<'_> {
        fn files(&self) -> Result<Vec<PathBuf>, VcsError> {
            Ok(self.0.keys().cloned().collect())
        }

        fn read(&self, path: &Path) -> Result<Vec<u8>, VcsError> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| VcsError::PathNotFound {
                    path: path.display().to_string(),
                })
        }
    }

    /// Provider serving [`FakeRepository`] values, counting clones.
    #[derive(Default)]
    pub struct FakeVcs {
        repositories: Mutex<HashMap<String, FakeRepository>>,
        unreachable: Mutex<HashSet<String>>,
        clones: AtomicUsize,
    }

    impl FakeVcs {
        pub fn with_repository(self, address: &str, repository: FakeRepository) -> Self {
            self.publish(address, repository);
            self
        }

        pub fn publish(&self, address: &str, repository: FakeRepository) {
            self.repositories
                .lock()
                .unwrap()
                .insert(address.to_owned(), repository);
        }

        pub fn set_unreachable(&self, address: &str) {
            self.unreachable.lock().unwrap().insert(address.to_owned());
        }

        pub fn clones(&self) -> usize {
            self.clones.load(Ordering::SeqCst)
        }
    }

    impl VersionControl for FakeVcs {
        fn clone_repository(
            &self,
            address: &str,
        ) -> Result<Box<dyn RemoteRepository>, VcsError> {
            self.clones.fetch_add(1, Ordering::SeqCst);
            if self.unreachable.lock().unwrap().contains(address) {
                return Err(VcsError::IO(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    format!("{address} is unreachable"),
                )));
            }
            self.repositories
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .map(|repository| Box::new(repository) as Box<dyn RemoteRepository>)
                .ok_or_else(|| VcsError::ReferenceNotFound {
                    reference: address.to_owned(),
                })
        }
    }
}
