use std::path::{Path, PathBuf};

use git2::{ErrorCode, Oid, Repository, Tree, TreeWalkMode, TreeWalkResult};
use log::{debug, trace};

use crate::{
    model::Selector,
    vcs::{RemoteRepository, SourceTree, VcsError},
};

use super::cache::REMOTE_HEAD;

const FILE_MODE_BLOB: i32 = 0o100644;
const FILE_MODE_BLOB_EXECUTABLE: i32 = 0o100755;
const HEAD_FALLBACKS: [&str; 2] = ["refs/remotes/origin/main", "refs/remotes/origin/master"];

/// A fetched cache entry.
pub struct GitRepository {
    git_repo: Repository,
    address: String,
}

impl GitRepository {
    pub fn new(git_repo: Repository, address: &str) -> GitRepository {
        GitRepository {
            git_repo,
            address: address.to_owned(),
        }
    }

    fn commit_hash_for_obj_str(&self, str: &str) -> Result<Oid, git2::Error> {
        Ok(self.git_repo.revparse_single(str)?.peel_to_commit()?.id())
    }
}

impl RemoteRepository for GitRepository {
    fn list_tags(&self) -> Result<Vec<String>, VcsError> {
        let tags = self.git_repo.tag_names(None)?;
        let tags: Vec<String> = tags.iter().flatten().map(str::to_owned).collect();
        trace!("{} has {} tags", self.address, tags.len());
        Ok(tags)
    }

    fn head_hash(&self) -> Result<String, VcsError> {
        std::iter::once(REMOTE_HEAD)
            .chain(HEAD_FALLBACKS)
            .find_map(|reference| self.commit_hash_for_obj_str(reference).ok())
            .map(|oid| oid.to_string())
            .ok_or_else(|| VcsError::MissingHead {
                address: self.address.clone(),
            })
    }

    fn checkout(&self, selector: &Selector) -> Result<Box<dyn SourceTree + '_>, VcsError> {
        let reference = match selector {
            Selector::Tag(name) => format!("refs/tags/{name}"),
            Selector::Branch(name) => format!("refs/remotes/origin/{name}"),
            Selector::Hash(id) => id.clone(),
            Selector::Unset => return Err(VcsError::UnresolvedSelector),
        };
        debug!("Checking out {} of {}", reference, self.address);

        let commit = self
            .git_repo
            .revparse_single(&reference)
            .and_then(|object| object.peel_to_commit())
            .map_err(|error| match error.code() {
                ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous => {
                    VcsError::ReferenceNotFound {
                        reference: reference.clone(),
                    }
                }
                _ => error.into(),
            })?;
        trace!("{} resolved to commit {}", reference, commit.id());

        Ok(Box::new(GitTree {
            repo: &self.git_repo,
            tree: commit.tree()?,
        }))
    }
}

/// The tree of one commit, read straight from the object database.
pub struct GitTree<'a> {
    repo: &'a Repository,
    tree: Tree<'a>,
}

impl SourceTree for GitTree<'_> {
    fn files(&self) -> Result<Vec<PathBuf>, VcsError> {
        let mut files = Vec::new();
        self.tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            match (entry.filemode(), entry.name()) {
                (FILE_MODE_BLOB | FILE_MODE_BLOB_EXECUTABLE, Some(name)) => {
                    files.push(Path::new(root).join(name));
                }
                (FILE_MODE_BLOB | FILE_MODE_BLOB_EXECUTABLE, None) => {
                    debug!("Skipping file with a non UTF-8 name under {}", root);
                }
                _ => {}
            }
            TreeWalkResult::Ok
        })?;
        Ok(files)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, VcsError> {
        let entry = self.tree.get_path(path).map_err(|error| match error.code() {
            ErrorCode::NotFound => VcsError::PathNotFound {
                path: path.display().to_string(),
            },
            _ => error.into(),
        })?;
        let blob = entry.to_object(self.repo)?.peel_to_blob()?;
        Ok(blob.content().to_vec())
    }
}
