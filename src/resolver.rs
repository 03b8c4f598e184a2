use log::debug;
use semver::Version;

use crate::{
    model::Selector,
    vcs::{RemoteRepository, VcsError},
};

/// Pins an unspecified version: the highest semantic version tag if the
/// repository has one, the head commit otherwise.
///
/// Tags that do not parse as versions are ignored.
pub fn latest_semver_tag_or_head(
    repository: &dyn RemoteRepository,
) -> Result<Selector, VcsError> {
    let tags = repository.list_tags()?;
    match latest_semver_tag(&tags) {
        Some(tag) => {
            debug!("Selected tag {} out of {} tags", tag, tags.len());
            Ok(Selector::Tag(tag.to_owned()))
        }
        None => {
            debug!("No version tag among {} tags, pinning head commit", tags.len());
            Ok(Selector::Hash(repository.head_hash()?))
        }
    }
}

/// Highest version among `tags`. Build metadata carries no precedence, so
/// tags of equal precedence are ordered by their text and the choice does
/// not depend on listing order.
pub fn latest_semver_tag(tags: &[String]) -> Option<&str> {
    tags.iter()
        .filter_map(|tag| parse_tolerant(tag).map(|version| (version, tag)))
        .max_by(|(a, a_tag), (b, b_tag)| a.cmp_precedence(b).then_with(|| a_tag.cmp(b_tag)))
        .map(|(_, tag)| tag.as_str())
}

/// Lenient version parsing: accepts a leading `v`, and fills in a missing
/// minor or patch component with zero.
pub fn parse_tolerant(tag: &str) -> Option<Version> {
    let tag = tag.trim();
    let tag = tag
        .strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag);

    let core_end = tag.find(['-', '+']).unwrap_or(tag.len());
    let (core, suffix) = tag.split_at(core_end);

    let mut parts = core
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                part.parse::<u64>().ok()
            }
        })
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    parts.resize(3, 0);

    Version::parse(&format!("{}.{}.{}{}", parts[0], parts[1], parts[2], suffix)).ok()
}
