use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Vendor git repositories, or parts of them, into your project tree.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Option<Command>,
    /// Project root directory
    #[clap(short, long, default_value = ".")]
    pub root: PathBuf,
    /// Name of the project document, relative to the root [default: gitvend.toml]
    #[clap(short = 'f', long)]
    pub config_file: Option<PathBuf>,
    /// Location of the repository cache [default: $HOME/.gitvend/cache]
    #[clap(short, long)]
    pub cache_directory: Option<PathBuf>,
    /// Refetch every dependency when no command is given
    #[clap(long)]
    pub force: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Vendors every declared dependency that is missing or out of date
    #[clap(alias = "install")]
    Sync {
        /// Refetch dependencies that are already up to date
        #[clap(long)]
        force: bool,
    },
    /// Declares a new dependency and vendors it
    Add {
        /// <host>/<path>, optionally followed by @tag, #branch or !commit
        url: String,
        /// Paths inside the repository to vendor instead of the whole repository
        pick: Vec<String>,
    },
    /// Forgets a dependency and deletes its vendored files
    #[clap(alias = "rm")]
    Remove {
        /// Key of the dependency as written in the project document
        key: String,
    },
    /// Refetches one dependency, or all of them
    Update { key: Option<String> },
    /// Creates an empty project document
    Init,
    /// Deletes the repository cache
    ClearCache,
}
