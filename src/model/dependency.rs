use std::{
    fmt::{Display, Write},
    io,
    path::{Component, Path, PathBuf},
    str::FromStr,
    sync::OnceLock,
};

use log::trace;
use regex_lite::Regex;
use url::Url;

use crate::{checksum::Checksum, model::ParseError};

const TAG_SEPARATOR: char = '@';
const BRANCH_SEPARATOR: char = '#';
const HASH_SEPARATOR: char = '!';

/// Which git reference a dependency is pinned to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Selector {
    Tag(String),
    Branch(String),
    Hash(String),
    /// Resolved to the latest version tag, or the head commit, on fetch.
    #[default]
    Unset,
}

impl Selector {
    fn from_separator(separator: char, value: &str) -> Option<Selector> {
        let value = value.to_owned();
        match separator {
            TAG_SEPARATOR => Some(Selector::Tag(value)),
            BRANCH_SEPARATOR => Some(Selector::Branch(value)),
            HASH_SEPARATOR => Some(Selector::Hash(value)),
            _ => None,
        }
    }

    /// Builds a selector from optional document fields, at most one of which may be set.
    pub fn from_fields(
        tag: Option<String>,
        branch: Option<String>,
        hash: Option<String>,
    ) -> Option<Selector> {
        match (tag, branch, hash) {
            (None, None, None) => Some(Selector::Unset),
            (Some(tag), None, None) => Some(Selector::Tag(tag)),
            (None, Some(branch), None) => Some(Selector::Branch(branch)),
            (None, None, Some(hash)) => Some(Selector::Hash(hash)),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        self == &Selector::Unset
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Selector::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            Selector::Branch(branch) => Some(branch),
            _ => None,
        }
    }

    pub fn hash(&self) -> Option<&str> {
        match self {
            Selector::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    fn write_suffix(&self, f: &mut impl Write) -> std::fmt::Result {
        match self {
            Selector::Tag(tag) => write!(f, "{TAG_SEPARATOR}{tag}"),
            Selector::Branch(branch) => write!(f, "{BRANCH_SEPARATOR}{branch}"),
            Selector::Hash(hash) => write!(f, "{HASH_SEPARATOR}{hash}"),
            Selector::Unset => Ok(()),
        }
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Tag(tag) => write!(f, "tag {tag}"),
            Selector::Branch(branch) => write!(f, "branch {branch}"),
            Selector::Hash(hash) => write!(f, "commit {hash}"),
            Selector::Unset => f.write_str("latest"),
        }
    }
}

/// Declared desired state of one vendored repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    /// Host and path of the repository, without scheme.
    pub address: String,
    /// Paths inside the repository to vendor. Empty means the whole repository.
    pub pick: Vec<String>,
    pub selector: Selector,
    /// Content checksum of the materialized files, set once materialized.
    pub checksum: Option<String>,
}

impl DependencySpec {
    pub fn new(address: impl Into<String>, selector: Selector) -> Self {
        DependencySpec {
            address: address.into(),
            pick: Vec::new(),
            selector,
            checksum: None,
        }
    }

    /// Parses `<host>/<path>[<sep><value>]` where `@`, `#` and `!` select a tag,
    /// a branch and a commit hash respectively.
    pub fn parse(input: &str) -> Result<DependencySpec, ParseError> {
        let input = input.trim();
        let invalid = |reason: &str| ParseError::InvalidDependencyUrl {
            url: input.to_owned(),
            reason: reason.to_owned(),
        };

        if scheme_regex().is_match(input) || ssh_login_regex().is_match(input) {
            return Err(invalid(
                "use <host>/<path> without a scheme or a login prefix",
            ));
        }

        let (address, selector) =
            match input.find([TAG_SEPARATOR, BRANCH_SEPARATOR, HASH_SEPARATOR]) {
                Some(index) => {
                    let (address, rest) = input.split_at(index);
                    let mut chars = rest.chars();
                    let separator = chars.next().ok_or_else(|| invalid("missing separator"))?;
                    let value = chars.as_str();
                    if value.is_empty() {
                        return Err(invalid("empty version after the separator"));
                    }
                    let selector = Selector::from_separator(separator, value)
                        .ok_or_else(|| invalid("unknown separator"))?;
                    (address, selector)
                }
                None => (input, Selector::Unset),
            };

        let address = address.trim_end_matches('/');
        if address
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid("empty, `.` and `..` path segments are not allowed"));
        }
        let url = Url::parse(&format!("https://{address}"))
            .map_err(|error| invalid(&error.to_string()))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host"));
        }
        if url.path().trim_matches('/').is_empty() {
            return Err(invalid("missing repository path"));
        }

        let spec = DependencySpec::new(address, selector);
        if spec.base_name().is_none() {
            return Err(invalid("repository name is empty"));
        }
        Ok(spec)
    }

    /// Replaces the pick list, normalizing every entry to a relative path.
    pub fn with_pick<I, S>(mut self, pick: I) -> Result<DependencySpec, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.pick = pick
            .into_iter()
            .map(|p| normalize_pick(p.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Canonical key used in the dependency and lock maps.
    pub fn key(&self) -> String {
        let mut key = self.address.clone();
        // Writing into a String cannot fail
        let _ = self.selector.write_suffix(&mut key);
        key
    }

    /// Final path segment of the address with any `.git` suffix stripped.
    ///
    /// `None` when that segment could not name a directory of its own.
    pub fn base_name(&self) -> Option<&str> {
        let last = match self.address.rsplit('/').next()? {
            "" | "." | ".." => return None,
            last => last,
        };
        let name = last.strip_suffix(".git").unwrap_or(last);
        match Path::new(name).components().collect::<Vec<_>>().as_slice() {
            [Component::Normal(_)] => Some(name),
            _ => None,
        }
    }

    /// Destination paths this spec materializes into.
    pub fn artifact_paths(&self, destination: &Path) -> Vec<PathBuf> {
        if self.pick.is_empty() {
            self.base_name()
                .map(|name| destination.join(name))
                .into_iter()
                .collect()
        } else {
            self.pick.iter().map(|p| destination.join(p)).collect()
        }
    }

    /// Recomputes the checksum of the files currently materialized for this spec.
    pub fn calc_checksum(&self, destination: &Path) -> io::Result<String> {
        let mut checksum = Checksum::new();
        for path in self.artifact_paths(destination) {
            checksum.add_path(&path)?;
        }
        Ok(checksum.finish())
    }

    /// Whether the materialized state diverges from `lock` and must be refetched.
    ///
    /// An `Unset` selector accepts whatever version the lock resolved it to.
    pub fn requires_update(
        &self,
        lock: Option<&DependencySpec>,
        destination: &Path,
        force: bool,
    ) -> bool {
        if force {
            return true;
        }
        let Some(lock) = lock else {
            trace!("{} has never been synchronized", self.key());
            return true;
        };
        let checksum = match self.calc_checksum(destination) {
            Ok(checksum) => checksum,
            Err(error) => {
                trace!("Could not verify {}: {}", self.key(), error);
                return true;
            }
        };
        if lock.checksum.as_deref() != Some(checksum.as_str()) {
            trace!("Content of {} changed on disk", self.key());
            return true;
        }
        if !self.selector.is_unset() && self.selector != lock.selector {
            trace!(
                "{} is pinned to {} but {} was last synchronized",
                self.key(),
                self.selector,
                lock.selector
            );
            return true;
        }
        if self.pick != lock.pick {
            trace!("Picked paths of {} changed", self.key());
            return true;
        }
        false
    }
}

impl FromStr for DependencySpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DependencySpec::parse(s)
    }
}

impl Display for DependencySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address)?;
        self.selector.write_suffix(f)
    }
}

fn scheme_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").unwrap())
}

fn ssh_login_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^/@]+@[^/:]+:").unwrap())
}

fn normalize_pick(pick: &str) -> Result<String, ParseError> {
    let invalid = |reason: &str| ParseError::InvalidPick {
        pick: pick.to_owned(),
        reason: reason.to_owned(),
    };
    let mut normalized = PathBuf::new();
    for component in Path::new(pick.trim()).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => return Err(invalid("must stay inside the repository")),
            Component::Prefix(_) => return Err(invalid("must be a relative path")),
        }
    }
    let normalized = normalized
        .to_str()
        .ok_or_else(|| invalid("must be valid UTF-8"))?
        .to_owned();
    if normalized.is_empty() {
        return Err(invalid("must not be empty"));
    }
    Ok(normalized)
}
