//! Defines the command-line arguments and subcommands for the xprin CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "xprin",
    version,
    about = "Acceptance tests for Crossplane compositions, driven by crossplane render."
)]
pub struct XprinArgs {
    /// Log at debug level (overridden by XPRIN_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover and run test suites.
    Test(TestArgs),
    /// Check that the configured dependencies are available.
    Check {
        /// Path to the configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct TestArgs {
    /// Suite files, or directories searched for xprin.yaml / *_xprin.yaml.
    #[arg(default_value = ".")]
    pub targets: Vec<PathBuf>,

    /// Only run test cases whose name matches this regular expression.
    #[arg(long, value_name = "REGEX")]
    pub run: Option<String>,

    /// Path to the configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Kill any external command running longer than this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print render output for every test case.
    #[arg(long)]
    pub show_render: bool,

    /// Print validate output for every test case.
    #[arg(long)]
    pub show_validate: bool,

    /// Print hook output for every test case.
    #[arg(long)]
    pub show_hooks: bool,

    /// Print every assertion result.
    #[arg(long)]
    pub show_assertions: bool,
}
