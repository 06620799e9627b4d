//! Runs every test case of one suite file in order.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, info};

use super::artifacts::ArtifactManager;
use super::result::{CompletedTests, TestCaseResult, TestStatus};
use super::{SuiteContext, TestCaseRunner};
use crate::paths::normalize;
use crate::suite::{self, TestSuite};
use crate::template::placeholder;
use crate::{Result, XprinError};

/// Outcome of a whole suite file.
#[derive(Debug, Clone)]
pub struct SuiteResult {
    pub file: PathBuf,
    pub results: Vec<TestCaseResult>,
    pub duration: Duration,
}

impl SuiteResult {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.status != TestStatus::Fail)
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Sequential suite execution on top of a [`TestCaseRunner`].
pub struct SuiteRunner<'r> {
    runner: &'r TestCaseRunner,
    filter: Option<Regex>,
}

impl<'r> SuiteRunner<'r> {
    pub fn new(runner: &'r TestCaseRunner) -> Self {
        Self {
            runner,
            filter: None,
        }
    }

    /// Only test cases whose name matches `filter` run; the rest are skipped.
    pub fn with_filter(mut self, filter: Option<Regex>) -> Self {
        self.filter = filter;
        self
    }

    /// Loads and runs the suite at `path`.
    pub fn run_file(&self, path: &Path) -> Result<SuiteResult> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            let cwd = std::env::current_dir().map_err(|e| XprinError::io(path, e))?;
            normalize(&cwd.join(path))
        };
        let suite = suite::load_suite(&absolute)?;
        self.run_suite(&absolute, &suite)
    }

    /// Runs an already parsed suite; `suite_file` must be absolute.
    pub fn run_suite(&self, suite_file: &Path, suite: &TestSuite) -> Result<SuiteResult> {
        let started = Instant::now();
        suite.validate_ids()?;
        let artifacts = ArtifactManager::create()?;
        let context = SuiteContext {
            suite_file,
            common: suite.common.as_ref(),
            artifacts: Some(&artifacts),
        };
        info!(suite = %suite_file.display(), tests = suite.tests.len(), "running suite");

        let mut completed = CompletedTests::new();
        let mut results = Vec::with_capacity(suite.tests.len());
        for case in &suite.tests {
            let name = placeholder::decode(&case.name);
            if let Some(filter) = &self.filter {
                if !filter.is_match(&name) {
                    debug!(test = %name, "skipping test case");
                    results.push(TestCaseResult::skipped(
                        name,
                        case.id.clone(),
                        format!("does not match --run '{}'", filter.as_str()),
                    ));
                    continue;
                }
            }
            let result = self.runner.run(&context, case.clone(), &completed);
            if let Some(id) = &result.id {
                completed.insert(id.clone(), result.clone());
            }
            results.push(result);
        }

        Ok(SuiteResult {
            file: suite_file.to_path_buf(),
            results,
            duration: started.elapsed(),
        })
    }
}
