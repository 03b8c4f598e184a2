use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DependencySpec, ParseError, Selector};

pub const DEFAULT_DESTINATION: &str = "vnd";

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Could not find {path}, run `gitvend init` to create it")]
    NotFound { path: String },
    #[error("Problem parsing {path}: {source}")]
    Parse { path: String, source: ParseError },
    #[error("File already exists: {path}")]
    AlreadyExists { path: String },
    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// The project document: where to vendor, what to vendor, and what was last vendored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub destination: PathBuf,
    pub dependencies: BTreeMap<String, DependencySpec>,
    pub dependency_locks: BTreeMap<String, DependencySpec>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            destination: PathBuf::from(DEFAULT_DESTINATION),
            dependencies: BTreeMap::new(),
            dependency_locks: BTreeMap::new(),
        }
    }
}

impl ProjectConfig {
    pub fn from_file(path: &Path) -> Result<ProjectConfig, ProjectError> {
        debug!("Loading project document {}", path.display());
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProjectError::NotFound {
                    path: path.display().to_string(),
                })
            }
            Err(error) => return Err(error.into()),
        };
        ProjectConfig::from_toml_str(&contents).map_err(|source| ProjectError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(data: &str) -> Result<ProjectConfig, ParseError> {
        let raw = toml::from_str::<RawProject>(data)?;

        let dependencies = raw
            .dependencies
            .into_iter()
            .map(|(key, entry)| entry.into_spec(&key).map(|spec| (key, spec)))
            .collect::<Result<_, _>>()?;
        let dependency_locks = raw
            .dependency_locks
            .into_iter()
            .map(|(key, entry)| entry.into_spec(&key).map(|spec| (key, spec)))
            .collect::<Result<_, _>>()?;

        Ok(ProjectConfig {
            destination: raw
                .destination
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DESTINATION)),
            dependencies,
            dependency_locks,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        let raw = RawProject {
            destination: Some(self.destination.clone()),
            dependencies: self
                .dependencies
                .iter()
                .map(|(key, spec)| (key.clone(), RawEntry::from_spec(spec, false)))
                .collect(),
            dependency_locks: self
                .dependency_locks
                .iter()
                .map(|(key, spec)| (key.clone(), RawEntry::from_spec(spec, true)))
                .collect(),
        };
        toml::to_string_pretty(&raw)
    }

    pub fn save(&self, path: &Path) -> Result<(), ProjectError> {
        std::fs::write(path, self.to_toml_string()?)?;
        debug!("Wrote project document to {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawProject {
    #[serde(default)]
    destination: Option<PathBuf>,
    #[serde(default)]
    dependencies: BTreeMap<String, RawEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    dependency_locks: BTreeMap<String, RawEntry>,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RawEntry {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pick: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    check: Option<String>,
}

impl RawEntry {
    fn from_spec(spec: &DependencySpec, with_checksum: bool) -> RawEntry {
        RawEntry {
            pick: spec.pick.clone(),
            tag: spec.selector.tag().map(str::to_owned),
            branch: spec.selector.branch().map(str::to_owned),
            hash: spec.selector.hash().map(str::to_owned),
            check: spec.checksum.clone().filter(|_| with_checksum),
        }
    }

    /// The key carries the address and possibly a selector; the entry may carry
    /// one too, as it does for locks of unpinned dependencies. Both must agree.
    fn into_spec(self, key: &str) -> Result<DependencySpec, ParseError> {
        let keyed = DependencySpec::parse(key)?;
        let ambiguous = || ParseError::AmbiguousSelector {
            key: key.to_owned(),
        };
        let fields =
            Selector::from_fields(self.tag, self.branch, self.hash).ok_or_else(ambiguous)?;
        let selector = match (keyed.selector.clone(), fields) {
            (Selector::Unset, fields) => fields,
            (from_key, Selector::Unset) => from_key,
            (from_key, fields) if from_key == fields => from_key,
            _ => return Err(ambiguous()),
        };
        Ok(DependencySpec {
            selector,
            checksum: self.check,
            ..keyed.with_pick(self.pick)?
        })
    }
}
