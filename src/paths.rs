//! Path expansion and existence checks for declared test inputs.

use std::path::{Component, Path, PathBuf};

use crate::{Result, XprinError};

/// Resolves paths declared in a suite file.
pub trait PathResolver {
    /// Expands `path` relative to the directory containing `base_file`.
    fn resolve(&self, base_file: &Path, path: &str) -> Result<PathBuf>;

    /// Fails unless `path` exists as a file or directory.
    fn verify_exists(&self, path: &Path) -> Result<()>;
}

/// Filesystem-backed resolver.
#[derive(Debug, Clone, Default)]
pub struct FsPathResolver {
    home: Option<PathBuf>,
}

impl FsPathResolver {
    /// Uses `$HOME` for `~` expansion.
    pub fn new() -> Self {
        Self {
            home: std::env::var_os("HOME")
                .filter(|h| !h.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
        }
    }

    fn expand_home(&self, path: &str) -> Result<PathBuf> {
        let rest = if path == "~" {
            ""
        } else if let Some(rest) = path.strip_prefix("~/") {
            rest
        } else {
            return Ok(PathBuf::from(path));
        };
        let home = self.home.as_ref().ok_or_else(|| XprinError::Path {
            path: path.to_string(),
            reason: "cannot expand '~': home directory is unknown".into(),
        })?;
        Ok(home.join(rest))
    }
}

impl PathResolver for FsPathResolver {
    fn resolve(&self, base_file: &Path, path: &str) -> Result<PathBuf> {
        if path.trim().is_empty() {
            return Err(XprinError::Path {
                path: path.to_string(),
                reason: "empty path".into(),
            });
        }
        let expanded = self.expand_home(path)?;
        if expanded.is_absolute() {
            return Ok(normalize(&expanded));
        }
        let base_dir = base_file.parent().unwrap_or_else(|| Path::new(""));
        let joined = base_dir.join(&expanded);
        let absolute = if joined.is_absolute() {
            joined
        } else {
            std::env::current_dir()
                .map_err(|e| XprinError::io(".", e))?
                .join(joined)
        };
        Ok(normalize(&absolute))
    }

    fn verify_exists(&self, path: &Path) -> Result<()> {
        match path.try_exists() {
            Ok(true) => Ok(()),
            Ok(false) => Err(XprinError::Path {
                path: path.display().to_string(),
                reason: "does not exist".into(),
            }),
            Err(e) => Err(XprinError::Path {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Lexically removes `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
