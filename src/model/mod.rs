use thiserror::Error;

pub mod dependency;
pub mod project;

pub use dependency::{DependencySpec, Selector};
pub use project::{ProjectConfig, ProjectError};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid dependency url `{url}`: {reason}")]
    InvalidDependencyUrl { url: String, reason: String },
    #[error("Invalid pick path `{pick}`: {reason}")]
    InvalidPick { pick: String, reason: String },
    #[error("Dependency `{key}` pins more than one of tag, branch and hash")]
    AmbiguousSelector { key: String },
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}
