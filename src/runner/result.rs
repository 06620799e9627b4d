//! Result records produced by a test case run.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::assertions::AssertionResult;
use crate::suite::Outputs;

/// Completed test cases with an ID, keyed by that ID.
pub type CompletedTests = BTreeMap<String, TestCaseResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Skip => "SKIP",
        }
    }
}

/// Outcome of a single hook command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookResult {
    pub name: Option<String>,
    /// The command as written in the suite, before templating.
    pub command: String,
    pub output: String,
    pub error: Option<String>,
}

impl HookResult {
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.command)
    }
}

/// Everything recorded while running one test case.
#[derive(Debug, Clone, Serialize)]
pub struct TestCaseResult {
    pub name: String,
    pub id: Option<String>,
    pub status: TestStatus,
    pub duration: Duration,
    /// Aggregated failure text; `None` when passed or when render failed.
    pub error: Option<String>,

    pub render_failed: bool,
    pub raw_render_output: String,
    pub formatted_render_output: String,

    pub validate_failed: bool,
    pub raw_validate_output: String,
    pub formatted_validate_output: String,

    pub pre_test_hooks: Vec<HookResult>,
    pub formatted_pre_test_hooks_output: String,
    pub post_test_hooks: Vec<HookResult>,
    pub formatted_post_test_hooks_output: String,

    pub assertions: Vec<AssertionResult>,
    pub failed_assertions: Vec<AssertionResult>,
    pub formatted_assertions_output: String,

    /// Set once the render output was persisted; `None` when the test
    /// case stopped earlier.
    pub outputs: Option<Outputs>,
    pub skip_reason: Option<String>,
}

impl TestCaseResult {
    pub fn new(name: impl Into<String>, id: Option<String>) -> Self {
        Self {
            name: name.into(),
            id,
            status: TestStatus::Fail,
            duration: Duration::ZERO,
            error: None,
            render_failed: false,
            raw_render_output: String::new(),
            formatted_render_output: String::new(),
            validate_failed: false,
            raw_validate_output: String::new(),
            formatted_validate_output: String::new(),
            pre_test_hooks: Vec::new(),
            formatted_pre_test_hooks_output: String::new(),
            post_test_hooks: Vec::new(),
            formatted_post_test_hooks_output: String::new(),
            assertions: Vec::new(),
            failed_assertions: Vec::new(),
            formatted_assertions_output: String::new(),
            outputs: None,
            skip_reason: None,
        }
    }

    pub fn skipped(name: impl Into<String>, id: Option<String>, reason: impl Into<String>) -> Self {
        let mut result = Self::new(name, id);
        result.status = TestStatus::Skip;
        result.skip_reason = Some(reason.into());
        result
    }

    /// Fails the test case with a single error, fixing its duration.
    pub fn fail(mut self, error: impl Into<String>, started: Instant) -> Self {
        self.status = TestStatus::Fail;
        self.error = Some(error.into());
        self.duration = started.elapsed();
        self
    }

    /// Fails through the render section only; no generic error is set.
    pub fn fail_render(mut self, started: Instant) -> Self {
        self.status = TestStatus::Fail;
        self.render_failed = true;
        self.error = None;
        self.duration = started.elapsed();
        self
    }

    /// Passes, or fails with every collected message newline-joined in the
    /// order they were collected.
    pub fn finalize(mut self, errors: Vec<String>, started: Instant) -> Self {
        if errors.is_empty() {
            self.status = TestStatus::Pass;
            self.error = None;
        } else {
            self.status = TestStatus::Fail;
            self.error = Some(errors.join("\n"));
        }
        self.duration = started.elapsed();
        self
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Pass
    }
}
