//! # Composite Preparation
//!
//! Collaborators the orchestrator uses to turn the declared composite input
//! into the document handed to the render tool:
//!
//! - [`ClaimConverter`] turns a namespaced claim into its composite resource.
//! - [`XrPatcher`] applies XRD schema defaults and connection-secret injection.
//!
//! Both are traits so the orchestrator can be exercised with fakes.

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::suite::Patches;
use crate::{Result, XprinError};

mod claim;
mod patch;

pub use claim::DefaultClaimConverter;
pub use patch::DefaultXrPatcher;

/// Converts a claim file into a composite resource file inside `out_dir`.
pub trait ClaimConverter {
    fn convert(&self, claim: &Path, out_dir: &Path) -> Result<PathBuf>;
}

/// Applies patches to a composite resource file, writing the result into `out_dir`.
pub trait XrPatcher {
    fn patch(
        &self,
        xr: &Path,
        patches: &Patches,
        xrd: Option<&Path>,
        out_dir: &Path,
    ) -> Result<PathBuf>;
}

fn read_yaml(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).map_err(|e| XprinError::io(path, e))?;
    serde_yaml::from_str(&raw).map_err(|e| XprinError::yaml(path, &e))
}

fn write_yaml(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| XprinError::io(parent, e))?;
    }
    let text = serde_yaml::to_string(value).map_err(|e| XprinError::yaml(path, &e))?;
    fs::write(path, text).map_err(|e| XprinError::io(path, e))
}

/// Returns `value[key]` as a mapping, creating it when absent.
fn child_mapping<'v>(value: &'v mut Value, key: &str) -> Option<&'v mut serde_yaml::Mapping> {
    let map = value.as_mapping_mut()?;
    let entry = map
        .entry(Value::String(key.to_string()))
        .or_insert_with(|| Value::Mapping(Default::default()));
    if entry.is_null() {
        *entry = Value::Mapping(Default::default());
    }
    entry.as_mapping_mut()
}

fn str_at<'v>(value: &'v Value, path: &[&str]) -> Option<&'v str> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}
