//! Temporary work areas and the suite-scoped artifacts directory.
//!
//! Both are backed by [`tempfile::TempDir`], so they are removed when they go
//! out of scope on every exit path.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::runner::stage::copy_path;
use crate::suite::Outputs;
use crate::{Result, XprinError};

/// Isolated `inputs/` and `outputs/` directories for one test case.
#[derive(Debug)]
pub struct TestCaseWorkspace {
    dir: TempDir,
    inputs: PathBuf,
    outputs: PathBuf,
}

impl TestCaseWorkspace {
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("xprin-testcase-")
            .tempdir()
            .map_err(|e| XprinError::io(std::env::temp_dir(), e))?;
        let inputs = dir.path().join("inputs");
        let outputs = dir.path().join("outputs");
        for path in [&inputs, &outputs] {
            fs::create_dir_all(path).map_err(|e| XprinError::io(path, e))?;
        }
        debug!(path = %dir.path().display(), "created test case workspace");
        Ok(Self {
            dir,
            inputs,
            outputs,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn inputs_dir(&self) -> &Path {
        &self.inputs
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs
    }
}

/// Durable per-suite storage for outputs of test cases that carry an ID.
#[derive(Debug)]
pub struct ArtifactManager {
    dir: TempDir,
}

impl ArtifactManager {
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("xprin-artifacts-")
            .tempdir()
            .map_err(|e| XprinError::io(std::env::temp_dir(), e))?;
        debug!(path = %dir.path().display(), "created artifacts directory");
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Copies `outputs_dir` to `<root>/<id>` and rewrites every path in
    /// `outputs` to point into the copy.
    pub fn persist(&self, id: &str, outputs_dir: &Path, outputs: &mut Outputs) -> Result<PathBuf> {
        let target = self.dir.path().join(id);
        if target.exists() {
            fs::remove_dir_all(&target).map_err(|e| XprinError::io(&target, e))?;
        }
        copy_path(outputs_dir, &target).map_err(|e| XprinError::io(&target, e))?;
        outputs.rebase(outputs_dir, &target);
        debug!(id, path = %target.display(), "persisted artifacts");
        Ok(target)
    }
}
