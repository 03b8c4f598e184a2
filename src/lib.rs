pub mod checksum;
pub mod cli;
pub mod config;
pub mod flock;
pub mod git;
pub mod materialize;
pub mod model;
pub mod resolver;
pub mod status;
pub mod store;
pub mod sync;
pub mod vcs;

mod api;

pub use api::{Gitvend, GitvendBuilder};
