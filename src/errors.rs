//! xprin Error Handling
//!
//! Every failure the runner can surface is a variant of [`XprinError`]. The
//! variants follow the failure taxonomy of a test case run:
//!
//! - **Configuration**: invalid test case or suite definitions, detected before
//!   any external process runs.
//! - **Resolution**: declared paths that cannot be expanded or do not exist.
//! - **Staging**: copying an input into the isolated work area failed.
//! - **Template**: an expression referenced an unknown key.
//! - **Process**: an external command could not be spawned or timed out.
//!
//! Hook, render and validate failures that are part of a normal run are not
//! errors of the runner itself; they are recorded on the test case result.

use std::path::PathBuf;
use std::sync::Arc;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Convenient alias used throughout the crate.
pub type Result<T> = std::result::Result<T, XprinError>;

#[derive(Error, Diagnostic, Debug)]
pub enum XprinError {
    #[error("{message}")]
    #[diagnostic(code(xprin::config::invalid))]
    Config { message: String },

    #[error("failed to resolve paths:\n{}", indent_lines(&.failures.join("\n"), 2))]
    #[diagnostic(code(xprin::paths::unresolved))]
    Resolution { failures: Vec<String> },

    #[error("path '{path}': {reason}")]
    #[diagnostic(code(xprin::paths::invalid))]
    Path { path: String, reason: String },

    #[error("failed to stage {kind} input '{}': {source}", .path.display())]
    #[diagnostic(code(xprin::stage::copy))]
    Stage {
        kind: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template error: {message}")]
    #[diagnostic(
        code(xprin::template::render),
        help("available roots are .Repositories, .Inputs, .Outputs and .Tests")
    )]
    Template { message: String },

    #[error("failed to run '{program}': {source}")]
    #[diagnostic(code(xprin::process::spawn))]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {seconds}s")]
    #[diagnostic(code(xprin::process::timeout))]
    Timeout { program: String, seconds: u64 },

    #[error("{message}")]
    #[diagnostic(code(xprin::hook::failed))]
    Hook { message: String },

    #[error("I/O error at '{}': {source}", .path.display())]
    #[diagnostic(code(xprin::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in '{}': {message}", .path.display())]
    #[diagnostic(code(xprin::yaml::parse))]
    Yaml { path: PathBuf, message: String },

    #[error("invalid test suite: {message}")]
    #[diagnostic(code(xprin::suite::parse))]
    SuiteParse {
        message: String,
        #[source_code]
        src: Arc<NamedSource<String>>,
        #[label("here")]
        span: Option<SourceSpan>,
    },

    #[error("failed to convert claim '{}': {reason}", .path.display())]
    #[diagnostic(code(xprin::convert::claim))]
    Convert { path: PathBuf, reason: String },

    #[error("failed to patch XR '{}': {reason}", .path.display())]
    #[diagnostic(code(xprin::convert::patch))]
    Patch { path: PathBuf, reason: String },

    #[error("missing dependency '{name}': {reason}")]
    #[diagnostic(
        code(xprin::config::dependency),
        help("install crossplane or set dependencies.crossplane in the xprin config")
    )]
    Dependency { name: String, reason: String },
}

impl XprinError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn yaml(path: impl Into<PathBuf>, err: &serde_yaml::Error) -> Self {
        Self::Yaml {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Indents every non-empty line of `text` by `width` spaces.
pub fn indent_lines(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_error_lists_every_failure() {
        let err = XprinError::Resolution {
            failures: vec!["xr: missing".into(), "composition: missing".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("  xr: missing"));
        assert!(msg.contains("  composition: missing"));
    }

    #[test]
    fn indent_skips_blank_lines() {
        assert_eq!(indent_lines("a\n\nb", 4), "    a\n\n    b");
    }
}
