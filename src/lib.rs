//! xprin runs acceptance tests for Crossplane compositions.
//!
//! A test suite is a YAML file listing test cases. Each test case names a
//! composite resource (or a claim), a composition and a function pipeline;
//! xprin renders them with `crossplane render`, optionally validates the
//! result against CRDs, evaluates assertions and runs hooks around it all.
//! See [`runner::TestCaseRunner`] for the per-test-case pipeline.

pub mod assertions;
pub mod cli;
pub mod config;
pub mod convert;
pub mod errors;
pub mod paths;
pub mod resources;
pub mod runner;
pub mod suite;
pub mod template;

pub use errors::{Result, XprinError};
