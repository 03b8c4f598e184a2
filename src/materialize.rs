use std::{
    io,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use thiserror::Error;

use crate::{
    checksum::Checksum,
    model::DependencySpec,
    vcs::{SourceTree, VcsError},
};

#[cfg(unix)]
const FILE_MODE: u32 = 0o644;
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("IO error on {path}: {source}")]
    IO { path: String, source: io::Error },
    #[error("Could not read {path} from the repository: {source}")]
    Read { path: String, source: VcsError },
    #[error("Path `{pick}` does not exist in the repository")]
    PickNotFound { pick: String },
    #[error("Address {address} does not end in a repository name")]
    Unnamed { address: String },
}

impl MaterializeError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> MaterializeError + '_ {
        move |source| MaterializeError::IO {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Copies the files `spec` selects from `tree` into `destination` and
/// returns the checksum of everything copied.
///
/// The paths `spec` materializes into are emptied first so no stale file
/// survives. Paths of an earlier form of the dependency are the caller's to
/// remove, since only the lock knows them.
pub fn materialize(
    tree: &dyn SourceTree,
    destination: &Path,
    spec: &DependencySpec,
) -> Result<String, MaterializeError> {
    clear(destination, spec)?;

    let mut files = tree.files().map_err(|source| MaterializeError::Read {
        path: ".".to_owned(),
        source,
    })?;
    files.sort();

    let mut checksum = Checksum::new();
    if spec.pick.is_empty() {
        let name = spec.base_name().ok_or_else(|| MaterializeError::Unnamed {
            address: spec.address.clone(),
        })?;
        let root = destination.join(name);
        debug!("Copying {} files to {}", files.len(), root.display());
        for file in &files {
            copy_file(tree, file, &root.join(file), &mut checksum)?;
        }
    } else {
        for pick in &spec.pick {
            let selected: Vec<&PathBuf> = files.iter().filter(|f| f.starts_with(pick)).collect();
            if selected.is_empty() {
                return Err(MaterializeError::PickNotFound { pick: pick.clone() });
            }
            debug!("Copying {} files picked by {}", selected.len(), pick);
            for file in selected {
                copy_file(tree, file, &destination.join(file), &mut checksum)?;
            }
        }
    }

    Ok(checksum.finish())
}

/// Removes the paths `spec` materializes into and nothing else.
pub fn clear(destination: &Path, spec: &DependencySpec) -> Result<(), MaterializeError> {
    for path in spec.artifact_paths(destination) {
        remove_path(&path)?;
    }
    Ok(())
}

/// Removes a file or directory tree. A missing path is not an error.
pub fn remove_path(path: &Path) -> Result<(), MaterializeError> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(error) => Err(error),
    };
    match result {
        Ok(()) => {
            trace!("Removed {}", path.display());
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(MaterializeError::io(path)(error)),
    }
}

fn copy_file(
    tree: &dyn SourceTree,
    source: &Path,
    target: &Path,
    checksum: &mut Checksum,
) -> Result<(), MaterializeError> {
    trace!("Copying {} to {}", source.display(), target.display());
    let contents = tree.read(source).map_err(|error| MaterializeError::Read {
        path: source.display().to_string(),
        source: error,
    })?;
    if let Some(parent) = target.parent() {
        create_dir_all(parent).map_err(MaterializeError::io(parent))?;
    }
    std::fs::write(target, &contents).map_err(MaterializeError::io(target))?;
    set_file_mode(target).map_err(MaterializeError::io(target))?;
    checksum.update(&contents);
    Ok(())
}

#[cfg(unix)]
fn create_dir_all(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)
}

#[cfg(not(unix))]
fn create_dir_all(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}

#[cfg(unix)]
fn set_file_mode(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE))
}

#[cfg(not(unix))]
fn set_file_mode(path: &Path) -> io::Result<()> {
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_readonly(false);
    std::fs::set_permissions(path, permissions)
}
