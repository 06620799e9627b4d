//! Copies resolved inputs into a test case's isolated input area.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{Result, XprinError};

/// Kind of a staged input; each kind gets its own subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    Xr,
    Claim,
    Composition,
    Functions,
    Crds,
    ContextFiles,
    ObservedResources,
    ExtraResources,
    FunctionCredentials,
    Xrd,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Xr => "xr",
            InputKind::Claim => "claim",
            InputKind::Composition => "composition",
            InputKind::Functions => "functions",
            InputKind::Crds => "crds",
            InputKind::ContextFiles => "context-files",
            InputKind::ObservedResources => "observed-resources",
            InputKind::ExtraResources => "extra-resources",
            InputKind::FunctionCredentials => "function-credentials",
            InputKind::Xrd => "xrd",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages inputs under `<root>/<kind>/<basename>`.
#[derive(Debug, Clone)]
pub struct InputStager {
    root: PathBuf,
}

impl InputStager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding every staged input of `kind`.
    pub fn kind_dir(&self, kind: InputKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    /// Copies `source` (file or directory, recursively) and returns the copy's path.
    pub fn stage(&self, source: &Path, kind: InputKind) -> Result<PathBuf> {
        let stage_err = |e: std::io::Error| XprinError::Stage {
            kind: kind.to_string(),
            path: source.to_path_buf(),
            source: e,
        };
        let file_name = source.file_name().ok_or_else(|| {
            stage_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no file name",
            ))
        })?;
        let kind_dir = self.kind_dir(kind);
        fs::create_dir_all(&kind_dir).map_err(stage_err)?;
        let mut target = kind_dir.join(file_name);
        let mut n = 1;
        while target.exists() {
            target = kind_dir.join(format!("{n}-{}", file_name.to_string_lossy()));
            n += 1;
        }
        copy_path(source, &target).map_err(stage_err)?;
        Ok(target)
    }
}

/// Copies a file, or a directory tree, from `source` to `target`.
pub fn copy_path(source: &Path, target: &Path) -> std::io::Result<()> {
    if !source.is_dir() {
        fs::copy(source, target)?;
        return Ok(());
    }
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(std::io::Error::other)?;
        let dest = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
