//! xprin configuration file.
//!
//! ```yaml
//! dependencies:
//!   crossplane: /usr/local/bin/crossplane
//! subcommands:
//!   render: render --include-full-xr
//!   validate: beta validate --error-on-missing-schemas
//! repositories:
//!   platform: ~/src/platform
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::{Result, XprinError};

pub const DEFAULT_CROSSPLANE: &str = "crossplane";
pub const DEFAULT_RENDER_SUBCOMMAND: &str = "render --include-full-xr";
pub const DEFAULT_VALIDATE_SUBCOMMAND: &str = "beta validate --error-on-missing-schemas";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub dependencies: Dependencies,
    pub subcommands: Subcommands,
    pub repositories: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Dependencies {
    pub crossplane: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Subcommands {
    pub render: String,
    pub validate: String,
}

impl Default for Dependencies {
    fn default() -> Self {
        Self {
            crossplane: DEFAULT_CROSSPLANE.to_string(),
        }
    }
}

impl Default for Subcommands {
    fn default() -> Self {
        Self {
            render: DEFAULT_RENDER_SUBCOMMAND.to_string(),
            validate: DEFAULT_VALIDATE_SUBCOMMAND.to_string(),
        }
    }
}

impl Config {
    /// `$HOME/.config/xprin.yaml`, when a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".config").join("xprin.yaml"))
    }

    /// Loads `explicit` when given (it must exist), otherwise the default
    /// location if present, otherwise built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => path,
                None => {
                    debug!("no config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        let raw = fs::read_to_string(&path).map_err(|e| XprinError::io(&path, e))?;
        let mut config = Self::from_yaml(&raw).map_err(|e| XprinError::yaml(&path, &e))?;
        config.expand_repositories();
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    fn expand_repositories(&mut self) {
        let Some(home) = env::var_os("HOME").map(PathBuf::from) else {
            return;
        };
        for path in self.repositories.values_mut() {
            if let Ok(rest) = path.strip_prefix("~") {
                *path = home.join(rest);
            }
        }
    }

    pub fn render_args(&self) -> Vec<String> {
        split_words(&self.subcommands.render)
    }

    pub fn validate_args(&self) -> Vec<String> {
        split_words(&self.subcommands.validate)
    }

    /// Verifies that the crossplane binary can be found.
    pub fn check_dependencies(&self) -> Result<PathBuf> {
        let name = &self.dependencies.crossplane;
        let missing = |reason: &str| XprinError::Dependency {
            name: name.clone(),
            reason: reason.to_string(),
        };
        if name.trim().is_empty() {
            return Err(missing("no command configured"));
        }
        let candidate = Path::new(name);
        if candidate.components().count() > 1 {
            return if candidate.is_file() {
                Ok(candidate.to_path_buf())
            } else {
                Err(missing("file does not exist"))
            };
        }
        let path_var = env::var_os("PATH").unwrap_or_default();
        env::split_paths(&path_var)
            .map(|dir| dir.join(name))
            .find(|p| p.is_file())
            .ok_or_else(|| missing("not found on PATH"))
    }
}

fn split_words(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = Config::from_yaml("repositories:\n  lib: /src/lib\n").unwrap();
        assert_eq!(config.dependencies.crossplane, DEFAULT_CROSSPLANE);
        assert_eq!(config.render_args(), vec!["render", "--include-full-xr"]);
        assert_eq!(config.repositories["lib"], PathBuf::from("/src/lib"));
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());
    }

    #[test]
    fn dependency_check_accepts_existing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("crossplane");
        fs::write(&bin, "#!/bin/sh\n").unwrap();
        let mut config = Config::default();
        config.dependencies.crossplane = bin.display().to_string();
        assert_eq!(config.check_dependencies().unwrap(), bin);

        config.dependencies.crossplane = dir.path().join("missing").display().to_string();
        assert!(config.check_dependencies().is_err());
    }
}
