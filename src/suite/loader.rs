// Test suite discovery and loading.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::{NamedSource, SourceSpan};
use tracing::debug;
use walkdir::WalkDir;

use crate::suite::TestSuite;
use crate::template::placeholder;
use crate::{Result, XprinError};

/// Returns true for `xprin.yaml` and `*_xprin.yaml` files.
fn is_suite_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| {
            name == "xprin.yaml"
                || name == "xprin.yml"
                || name.ends_with("_xprin.yaml")
                || name.ends_with("_xprin.yml")
        })
}

/// Expands CLI targets into a sorted, de-duplicated list of suite files.
///
/// A file target is taken as-is whatever its name; a directory is walked
/// recursively for suite files.
pub fn discover_suite_files<P: AsRef<Path>>(targets: &[P]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for target in targets {
        let target = target.as_ref();
        if target.is_file() {
            files.push(target.to_path_buf());
            continue;
        }
        if !target.is_dir() {
            return Err(XprinError::Path {
                path: target.display().to_string(),
                reason: "no such file or directory".into(),
            });
        }
        for entry in WalkDir::new(target) {
            let entry = entry.map_err(|e| XprinError::Path {
                path: target.display().to_string(),
                reason: format!("failed to walk directory: {e}"),
            })?;
            if entry.file_type().is_file() && is_suite_file(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    files.sort();
    files.dedup();
    debug!(count = files.len(), "discovered suite files");
    Ok(files)
}

/// Reads and parses a suite file.
///
/// Template expressions are encoded into placeholder tokens before parsing so
/// that `{{ ... }}` never reaches the YAML parser; they stay encoded in the
/// returned suite until the runner resolves them.
pub fn load_suite(path: &Path) -> Result<TestSuite> {
    let raw = fs::read_to_string(path).map_err(|e| XprinError::io(path, e))?;
    parse_suite(&path.display().to_string(), &raw)
}

/// Parses suite text; `name` is used for diagnostics only.
pub fn parse_suite(name: &str, raw: &str) -> Result<TestSuite> {
    let encoded = placeholder::encode(raw);
    serde_yaml::from_str::<TestSuite>(&encoded).map_err(|e| {
        let span = e.location().map(|loc| {
            // Offsets refer to the encoded text; clamp into the original.
            let offset = loc.index().min(raw.len());
            SourceSpan::from((offset, 0))
        });
        XprinError::SuiteParse {
            message: e.to_string(),
            src: Arc::new(NamedSource::new(name, raw.to_string())),
            span,
        }
    })
}
