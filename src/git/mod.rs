//! `git2` implementation of the version control capability.

pub mod cache;
pub mod repository;

pub use cache::{CacheError, GitCache};
