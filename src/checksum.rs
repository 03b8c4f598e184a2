use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Running content hash used to detect drift of materialized files.
///
/// Only file bytes are fed in, in the order they are visited. Callers that
/// produce the same sequence of files get the same checksum, which is how the
/// copy-time checksum and the on-disk one are kept comparable.
#[derive(Default, Clone)]
pub struct Checksum {
    hasher: Sha256,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }

    /// Feeds every regular file under `path` into the checksum.
    ///
    /// Files are hashed directly, directories are walked and their files
    /// hashed in path order. A missing path contributes nothing.
    pub fn add_path(&mut self, path: &Path) -> io::Result<()> {
        let metadata = match std::fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error),
        };
        if metadata.is_dir() {
            for file in sorted_files(path)? {
                self.add_file(&file)?;
            }
            Ok(())
        } else if metadata.is_file() {
            self.add_file(path)
        } else {
            Ok(())
        }
    }

    fn add_file(&mut self, path: &Path) -> io::Result<()> {
        let mut file = File::open(path)?;
        let mut buffer = [0u8; 8192];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                return Ok(());
            }
            self.hasher.update(&buffer[..read]);
        }
    }
}

/// Regular files below `dir`, symlinks excluded, sorted by path.
pub fn sorted_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn checksum_of(paths: &[&Path]) -> String {
        let mut checksum = Checksum::new();
        for path in paths {
            checksum.add_path(path).unwrap();
        }
        checksum.finish()
    }

    #[test]
    fn missing_paths_contribute_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            checksum_of(&[&dir.path().join("missing")]),
            Checksum::new().finish()
        );
    }

    #[test]
    fn directory_is_hashed_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib/b")).unwrap();
        std::fs::write(dir.path().join("lib/b/z.txt"), "z").unwrap();
        std::fs::write(dir.path().join("lib/a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("lib/c.txt"), "c").unwrap();

        let mut expected = Checksum::new();
        expected.update(b"a");
        expected.update(b"z");
        expected.update(b"c");

        assert_eq!(checksum_of(&[&dir.path().join("lib")]), expected.finish());
    }

    #[test]
    fn content_change_changes_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "one").unwrap();
        let before = checksum_of(&[&file]);
        std::fs::write(&file, "two").unwrap();
        assert_ne!(before, checksum_of(&[&file]));
    }
}
