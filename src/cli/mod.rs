//! The xprin Command-Line Interface.
//!
//! This module is the main entry point for all CLI commands and orchestrates
//! the core library functions.

use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use regex::Regex;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{Command, TestArgs, XprinArgs};
use crate::cli::output::{RenderOptions, ReportPrinter};
use crate::config::Config;
use crate::runner::result::TestStatus;
use crate::runner::{SuiteRunner, TestCaseRunner};
use crate::suite::discover_suite_files;
use crate::{Result, XprinError};

pub mod args;
pub mod output;

pub const LOG_ENV: &str = "XPRIN_LOG";

/// The main entry point for the CLI.
pub fn run() -> ExitCode {
    let args = XprinArgs::parse();
    init_logging(args.verbose);

    let outcome = match args.command {
        Command::Test(test) => run_tests(test),
        Command::Check { config } => check(config.as_deref()),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so the report on stdout stays clean.
fn init_logging(verbose: bool) {
    let default = if verbose { "xprin=debug" } else { "xprin=warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// ============================================================================
// SUBCOMMANDS
// ============================================================================

fn run_tests(args: TestArgs) -> Result<bool> {
    let config = Config::load(args.config.as_deref())?;
    let filter = args
        .run
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| XprinError::config(format!("invalid --run pattern: {e}")))?;
    let files = discover_suite_files(&args.targets)?;
    if files.is_empty() {
        return Err(XprinError::config("no test suites found"));
    }
    debug!(suites = files.len(), "discovered suites");

    let runner = TestCaseRunner::new(config).with_timeout(args.timeout.map(Duration::from_secs));
    let suites = SuiteRunner::new(&runner).with_filter(filter);
    let options = RenderOptions {
        show_render: args.show_render,
        show_validate: args.show_validate,
        show_hooks: args.show_hooks,
        show_assertions: args.show_assertions,
        ..Default::default()
    };
    let mut printer = ReportPrinter::new(options.stdout(), options);

    let mut ok = true;
    let (mut passed, mut failed, mut skipped) = (0, 0, 0);
    for file in &files {
        let report = match suites.run_file(file) {
            Ok(suite) => {
                ok &= suite.passed();
                passed += suite.count(TestStatus::Pass);
                failed += suite.count(TestStatus::Fail);
                skipped += suite.count(TestStatus::Skip);
                printer.print_suite(&suite)
            }
            Err(e) => {
                ok = false;
                printer.print_suite_error(file, &e.to_string())
            }
        };
        report.map_err(|e| XprinError::io("<stdout>", e))?;
    }
    printer
        .print_summary(passed, failed, skipped)
        .map_err(|e| XprinError::io("<stdout>", e))?;
    Ok(ok)
}

fn check(config: Option<&std::path::Path>) -> Result<bool> {
    let config = Config::load(config)?;
    let found = config.check_dependencies()?;
    let mut out = std::io::stdout();
    writeln!(out, "crossplane: {}", found.display()).map_err(|e| XprinError::io("<stdout>", e))?;
    Ok(true)
}
