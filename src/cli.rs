//! Command-line interface schema for git-sync.
//!
//! Three positional arguments select the upstream, the branch, and the
//! local checkout; the flags only tune observability.

use clap::Parser;
use std::path::PathBuf;

/// Keep a local checkout in sync with an upstream branch, preserving user
/// artifacts under timestamped backup names.
#[derive(Parser, Debug)]
#[command(name = "git-sync", about)]
pub struct Cli {
    /// URL of the authoritative upstream repository
    pub repo_url: String,

    /// Branch to track on the upstream remote
    pub branch: String,

    /// Local directory holding the checkout
    pub repo_dir: PathBuf,

    /// Enable debug-level logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Report how long the sync took
    #[arg(short = 'p', long = "profile")]
    pub profile: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
