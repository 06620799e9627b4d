//! # Test Case Execution Pipeline
//!
//! [`TestCaseRunner`] drives one test case through a fixed sequence of
//! phases and produces a [`TestCaseResult`]:
//!
//! 1. **Init**: create the isolated workspace, merge suite common defaults
//! 2. **Templates**: resolve `{{ ... }}` in inputs and patches
//! 3. **Validate**: mandatory fields, claim/XR exclusivity, patch rules
//! 4. **Paths**: resolve and verify every declared path, reporting all misses
//! 5. **Stage**: copy inputs into the workspace
//! 6. **Pre-test hooks**: any failure ends the test case
//! 7. **Composite**: convert a claim, or use the XR as given
//! 8. **Patch**: XRD defaults and connection-secret injection, when requested
//! 9. **Render**: failure ends the test case through the render section only
//! 10. **Persist**: write the render stream, the XR and one file per resource
//! 11. **Validate (tool)**: only with CRDs; failure is recorded, not fatal
//! 12. **Assertions**: all evaluated; failures recorded
//! 13. **Post-test hooks**: always run when declared
//! 14. **Artifacts**: test cases with an ID keep their outputs for later ones
//! 15. **Finalize**: every recorded failure, newline-joined, fails the case
//!
//! Failures in phases 11–14 accumulate instead of short-circuiting, so a
//! single run reports validate, assertion and hook problems together.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::assertions::{render_assertions, AssertionExecutor, AssertionResult};
use crate::config::Config;
use crate::convert::{ClaimConverter, DefaultClaimConverter, DefaultXrPatcher, XrPatcher};
use crate::errors::indent_lines;
use crate::paths::{FsPathResolver, PathResolver};
use crate::resources::{self, Resource};
use crate::suite::{Common, Outputs, TestCase};
use crate::template::{self, placeholder, TemplateContext};
use crate::{Result, XprinError};

pub mod artifacts;
pub mod command;
pub mod hooks;
pub mod result;
pub mod stage;
pub mod suite;

use artifacts::{ArtifactManager, TestCaseWorkspace};
use command::{CommandOutput, CommandRunner, Invocation, ProcessRunner};
use hooks::{HookExecutor, HookPhase};
use result::{CompletedTests, TestCaseResult};
use stage::{InputKind, InputStager};

pub use suite::{SuiteResult, SuiteRunner};

pub const RENDERED_FILE: &str = "rendered.yaml";
pub const XR_FILE: &str = "xr.yaml";
pub const VALIDATE_FILE: &str = "validate.yaml";

/// Per-suite information a test case run needs.
#[derive(Debug, Clone, Copy)]
pub struct SuiteContext<'a> {
    /// Absolute path of the suite file; relative inputs and hook working
    /// directories are derived from it.
    pub suite_file: &'a Path,
    pub common: Option<&'a Common>,
    pub artifacts: Option<&'a ArtifactManager>,
}

impl SuiteContext<'_> {
    pub fn suite_dir(&self) -> &Path {
        self.suite_file.parent().unwrap_or_else(|| Path::new("."))
    }
}

// =============================================================================
// RUNNER
// =============================================================================

/// Runs single test cases with constructor-injected collaborators.
pub struct TestCaseRunner {
    config: Config,
    paths: Box<dyn PathResolver>,
    commands: Box<dyn CommandRunner>,
    claims: Box<dyn ClaimConverter>,
    patcher: Box<dyn XrPatcher>,
}

impl TestCaseRunner {
    /// Runner backed by the filesystem and real processes.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            paths: Box::new(FsPathResolver::new()),
            commands: Box::new(ProcessRunner::default()),
            claims: Box::new(DefaultClaimConverter),
            patcher: Box::new(DefaultXrPatcher),
        }
    }

    /// Limits every external command to `timeout`.
    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        self.with_command_runner(ProcessRunner::new(timeout))
    }

    pub fn with_command_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.commands = Box::new(runner);
        self
    }

    pub fn with_path_resolver(mut self, resolver: impl PathResolver + 'static) -> Self {
        self.paths = Box::new(resolver);
        self
    }

    pub fn with_claim_converter(mut self, converter: impl ClaimConverter + 'static) -> Self {
        self.claims = Box::new(converter);
        self
    }

    pub fn with_xr_patcher(mut self, patcher: impl XrPatcher + 'static) -> Self {
        self.patcher = Box::new(patcher);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn repositories(&self) -> &BTreeMap<String, PathBuf> {
        &self.config.repositories
    }

    /// Runs `case` to completion. Never panics on test failures; every outcome
    /// is reported through the returned result.
    pub fn run(
        &self,
        suite: &SuiteContext<'_>,
        mut case: TestCase,
        completed: &CompletedTests,
    ) -> TestCaseResult {
        let started = Instant::now();
        let mut result = TestCaseResult::new(placeholder::decode(&case.name), case.id.clone());
        info!(test = %result.name, "running test case");

        // Init. The workspace lives until this function returns.
        let workspace = match TestCaseWorkspace::create() {
            Ok(ws) => ws,
            Err(e) => return result.fail(e.to_string(), started),
        };
        if let Some(common) = suite.common {
            case.merge_common(common);
        }

        // Templates
        case = match self.resolve_templates(case, completed) {
            Ok(case) => case,
            Err(e) => return result.fail(e.to_string(), started),
        };
        result.name = case.name.clone();

        // Validate
        if let Err(e) = case.validate() {
            return result.fail(e.to_string(), started);
        }

        // Paths
        if let Err(e) = self.resolve_paths(suite.suite_file, &mut case) {
            return result.fail(e.to_string(), started);
        }

        // Stage
        let stager = InputStager::new(workspace.inputs_dir());
        if let Err(e) = stage_inputs(&stager, &mut case) {
            return result.fail(e.to_string(), started);
        }
        debug!(test = %result.name, "inputs staged");

        // Pre-test hooks
        let hook_executor = HookExecutor::new(self.commands.as_ref(), suite.suite_dir());
        if !case.hooks.pre_test.is_empty() {
            let ctx = TemplateContext::new(self.repositories(), &case.inputs, None, completed);
            let (hook_results, err) = hook_executor.run(&case.hooks.pre_test, HookPhase::PreTest, &ctx);
            result.formatted_pre_test_hooks_output = hooks::format_results(&hook_results);
            result.pre_test_hooks = hook_results;
            if let Some(e) = err {
                return result.fail(e.to_string(), started);
            }
        }

        // Composite
        let composite = match self.prepare_composite(&case, &stager) {
            Ok(path) => path,
            Err(e) => return result.fail(e.to_string(), started),
        };

        // Render
        let invocation = self.render_invocation(&composite, &case);
        let rendered = match self.commands.run(&invocation) {
            Ok(output) if output.success() => output,
            Ok(output) => {
                warn!(test = %result.name, exit_code = ?output.exit_code, "render failed");
                result.raw_render_output = output.combined();
                result.formatted_render_output = format_render_failure(&output);
                return result.fail_render(started);
            }
            Err(e) => {
                warn!(test = %result.name, error = %e, "render could not be run");
                result.raw_render_output = e.to_string();
                result.formatted_render_output = indent_lines(&e.to_string(), 4);
                return result.fail_render(started);
            }
        };
        result.raw_render_output = rendered.stdout_lossy();

        // Persist
        let (resources, mut outputs) =
            match persist_render(&result.raw_render_output, &composite, workspace.outputs_dir()) {
                Ok(persisted) => persisted,
                Err(e) => return result.fail(e.to_string(), started),
            };
        result.formatted_render_output = format_render_success(&resources);
        debug!(test = %result.name, count = outputs.render_count, "render output persisted");

        let mut failures = Vec::new();

        // Validate (tool)
        if !case.inputs.crds.is_empty() {
            let crd_dir = stager.kind_dir(InputKind::Crds);
            match self.validate(&crd_dir, &outputs.render, workspace.outputs_dir()) {
                Ok((output, report)) => {
                    outputs.validate = Some(report);
                    result.raw_validate_output = output.combined();
                    result.formatted_validate_output = result.raw_validate_output.trim().to_string();
                    if !output.success() {
                        result.validate_failed = true;
                        failures.push(format_validate_failure(&output));
                    }
                }
                Err(e) => {
                    result.validate_failed = true;
                    result.formatted_validate_output = e.to_string();
                    failures.push(format!("validate could not be run: {e}"));
                }
            }
        }

        // Assertions
        if !case.assertions.is_empty() {
            let ctx = TemplateContext::new(self.repositories(), &case.inputs, Some(&outputs), completed);
            match render_assertions(&case.assertions, &ctx) {
                Ok(assertions) => {
                    let (all, failed) = AssertionExecutor::new(&resources).evaluate(&assertions);
                    result.formatted_assertions_output = format_assertions(&all);
                    if !failed.is_empty() {
                        failures.push(format_assertion_failures(&failed, all.len()));
                    }
                    result.assertions = all;
                    result.failed_assertions = failed;
                }
                Err(e) => {
                    result.formatted_assertions_output = e.to_string();
                    failures.push(format!("failed to render assertions: {e}"));
                }
            }
        }

        // Post-test hooks
        if !case.hooks.post_test.is_empty() {
            let ctx = TemplateContext::new(self.repositories(), &case.inputs, Some(&outputs), completed);
            let (hook_results, err) =
                hook_executor.run(&case.hooks.post_test, HookPhase::PostTest, &ctx);
            result.formatted_post_test_hooks_output = hooks::format_results(&hook_results);
            result.post_test_hooks = hook_results;
            if let Some(e) = err {
                failures.push(e.to_string());
            }
        }

        // Artifacts
        if let (Some(id), Some(artifacts)) = (case.id.as_deref(), suite.artifacts) {
            if let Err(e) = artifacts.persist(id, workspace.outputs_dir(), &mut outputs) {
                failures.push(format!("failed to persist artifacts: {e}"));
            }
        }
        result.outputs = Some(outputs);

        // Finalize
        let result = result.finalize(failures, started);
        info!(test = %result.name, status = result.status.as_str(), "test case finished");
        result
    }

    // -------------------------------------------------------------------------
    // Phases
    // -------------------------------------------------------------------------

    /// Renders templates in everything but hooks and assertions, which are
    /// templated later with outputs available.
    fn resolve_templates(&self, mut case: TestCase, completed: &CompletedTests) -> Result<TestCase> {
        let hooks = std::mem::take(&mut case.hooks);
        let assertions = std::mem::take(&mut case.assertions);

        let serialized = serde_yaml::to_string(&case)
            .map_err(|e| XprinError::template(format!("failed to serialize test case: {e}")))?;
        if placeholder::contains_tokens(&serialized) {
            let snapshot = case.inputs.clone();
            let ctx = TemplateContext::new(self.repositories(), &snapshot, None, completed);
            let context_values = std::mem::take(&mut case.inputs.context_values);
            let value = serde_yaml::to_value(&case)
                .map_err(|e| XprinError::template(format!("failed to serialize test case: {e}")))?;
            case = serde_yaml::from_value(template::resolve_strings(value, &ctx)?).map_err(|e| {
                XprinError::template(format!("templated test case is invalid: {e}"))
            })?;
            // Context values keep the YAML type of what they render to.
            for (key, value) in context_values {
                let value = template::resolve_value(value, &ctx)?;
                case.inputs.context_values.insert(key, value);
            }
            debug!(test = %case.name, "resolved test case templates");
        }

        case.hooks = hooks;
        case.assertions = assertions;
        Ok(case)
    }

    /// Rewrites every declared path to an absolute, existing one. All
    /// failures are collected before returning.
    fn resolve_paths(&self, suite_file: &Path, case: &mut TestCase) -> Result<()> {
        let mut failures = Vec::new();
        let mut resolve = |label: &str, value: &mut String| {
            if value.is_empty() {
                return;
            }
            let checked = self
                .paths
                .resolve(suite_file, value)
                .and_then(|p| self.paths.verify_exists(&p).map(|()| p));
            match checked {
                Ok(p) => *value = p.display().to_string(),
                Err(e) => failures.push(format!("{label}: {e}")),
            }
        };

        let inputs = &mut case.inputs;
        resolve("xr", &mut inputs.xr);
        resolve("claim", &mut inputs.claim);
        resolve("composition", &mut inputs.composition);
        resolve("functions", &mut inputs.functions);
        for (i, crd) in inputs.crds.iter_mut().enumerate() {
            resolve(&format!("crds[{i}]"), crd);
        }
        for (key, file) in inputs.context_files.iter_mut() {
            resolve(&format!("contextFiles[{key}]"), file);
        }
        resolve("observedResources", &mut inputs.observed_resources);
        resolve("extraResources", &mut inputs.extra_resources);
        resolve("functionCredentials", &mut inputs.function_credentials);
        resolve("xrd", &mut case.patches.xrd);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(XprinError::Resolution { failures })
        }
    }

    /// Claim conversion and optional patching.
    fn prepare_composite(&self, case: &TestCase, stager: &InputStager) -> Result<PathBuf> {
        let mut composite = if case.has_claim() {
            let out_dir = stager.kind_dir(InputKind::Claim).join("converted");
            let xr = self.claims.convert(Path::new(&case.inputs.claim), &out_dir)?;
            debug!(xr = %xr.display(), "converted claim to composite");
            xr
        } else {
            PathBuf::from(&case.inputs.xr)
        };

        if case.patches.is_set() {
            let xrd = (!case.patches.xrd.is_empty()).then(|| Path::new(&case.patches.xrd));
            let out_dir = stager.kind_dir(InputKind::Xr).join("patched");
            composite = self.patcher.patch(&composite, &case.patches, xrd, &out_dir)?;
            debug!(xr = %composite.display(), "patched composite");
        }
        Ok(composite)
    }

    fn render_invocation(&self, composite: &Path, case: &TestCase) -> Invocation {
        let inputs = &case.inputs;
        let mut invocation = Invocation::new(&self.config.dependencies.crossplane)
            .args(self.config.render_args())
            .arg(composite.display().to_string())
            .arg(&inputs.composition)
            .arg(&inputs.functions);
        for (key, file) in &inputs.context_files {
            invocation = invocation.arg("--context-files").arg(format!("{key}={file}"));
        }
        for (key, value) in &inputs.context_values {
            let json = serde_json::to_string(value).unwrap_or_else(|_| "null".into());
            invocation = invocation.arg("--context-values").arg(format!("{key}={json}"));
        }
        if !inputs.observed_resources.is_empty() {
            invocation = invocation
                .arg("--observed-resources")
                .arg(&inputs.observed_resources);
        }
        if !inputs.extra_resources.is_empty() {
            invocation = invocation.arg("--extra-resources").arg(&inputs.extra_resources);
        }
        if !inputs.function_credentials.is_empty() {
            invocation = invocation
                .arg("--function-credentials")
                .arg(&inputs.function_credentials);
        }
        invocation
    }

    /// Runs the validate tool and writes its report next to the render output.
    fn validate(
        &self,
        crd_dir: &Path,
        rendered: &Path,
        outputs_dir: &Path,
    ) -> Result<(CommandOutput, PathBuf)> {
        let invocation = Invocation::new(&self.config.dependencies.crossplane)
            .args(self.config.validate_args())
            .arg(crd_dir.display().to_string())
            .arg(rendered.display().to_string());
        let output = self.commands.run(&invocation)?;
        let report = outputs_dir.join(VALIDATE_FILE);
        fs::write(&report, output.combined()).map_err(|e| XprinError::io(&report, e))?;
        Ok((output, report))
    }
}

// =============================================================================
// PHASE HELPERS
// =============================================================================

/// Copies every resolved input into the workspace and points the test case
/// at the copies.
fn stage_inputs(stager: &InputStager, case: &mut TestCase) -> Result<()> {
    let stage = |value: &mut String, kind: InputKind| -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        let staged = stager.stage(Path::new(value.as_str()), kind)?;
        *value = staged.display().to_string();
        Ok(())
    };

    let inputs = &mut case.inputs;
    stage(&mut inputs.xr, InputKind::Xr)?;
    stage(&mut inputs.claim, InputKind::Claim)?;
    stage(&mut inputs.composition, InputKind::Composition)?;
    stage(&mut inputs.functions, InputKind::Functions)?;
    for crd in inputs.crds.iter_mut() {
        stage(crd, InputKind::Crds)?;
    }
    for file in inputs.context_files.values_mut() {
        stage(file, InputKind::ContextFiles)?;
    }
    stage(&mut inputs.observed_resources, InputKind::ObservedResources)?;
    stage(&mut inputs.extra_resources, InputKind::ExtraResources)?;
    stage(&mut inputs.function_credentials, InputKind::FunctionCredentials)?;
    stage(&mut case.patches.xrd, InputKind::Xrd)?;
    Ok(())
}

/// Writes the render stream, the extracted XR and one file per resource.
fn persist_render(
    stream: &str,
    composite: &Path,
    outputs_dir: &Path,
) -> Result<(Vec<Resource>, Outputs)> {
    let render_path = outputs_dir.join(RENDERED_FILE);
    fs::write(&render_path, stream).map_err(|e| XprinError::io(&render_path, e))?;
    let resources = resources::parse_stream(stream).map_err(|e| XprinError::yaml(&render_path, &e))?;

    let composite_text = fs::read_to_string(composite).map_err(|e| XprinError::io(composite, e))?;
    let (xr_kind, xr_name) =
        resources::identify(&composite_text).map_err(|e| XprinError::yaml(composite, &e))?;
    let xr_path = outputs_dir.join(XR_FILE);
    let xr_text = match resources::extract_xr(&resources, &xr_kind, &xr_name) {
        Some(xr) => xr.to_yaml()?,
        None => {
            warn!(kind = %xr_kind, name = %xr_name, "rendered output has no composite resource");
            String::new()
        }
    };
    fs::write(&xr_path, xr_text).map_err(|e| XprinError::io(&xr_path, e))?;

    let mut outputs = Outputs {
        render: render_path,
        xr: xr_path,
        validate: None,
        render_count: resources.len(),
        rendered: BTreeMap::new(),
    };
    for resource in &resources {
        let mut path = outputs_dir.join(resource.file_name());
        let mut n = 2;
        while path.exists() {
            path = outputs_dir.join(format!(
                "{}-{n}.yaml",
                resource.file_name().trim_end_matches(".yaml")
            ));
            n += 1;
        }
        fs::write(&path, resource.to_yaml()?).map_err(|e| XprinError::io(&path, e))?;
        outputs.rendered.insert(resource.key(), path);
    }
    Ok((resources, outputs))
}

// =============================================================================
// FORMATTING
// =============================================================================

fn format_render_success(resources: &[Resource]) -> String {
    let mut lines = vec![format!("rendered {} resources", resources.len())];
    lines.extend(resources.iter().map(|r| format!("    - {}", r.key())));
    lines.join("\n")
}

fn format_render_failure(output: &CommandOutput) -> String {
    format!(
        "render failed with exit code {}:\n{}",
        output.code(),
        indent_lines(output.combined().trim(), 4)
    )
}

fn format_validate_failure(output: &CommandOutput) -> String {
    let body = output.combined();
    let body = body.trim();
    if body.is_empty() {
        format!("validate failed with exit code {}", output.code())
    } else {
        format!(
            "validate failed with exit code {}:\n{}",
            output.code(),
            indent_lines(body, 4)
        )
    }
}

fn format_assertions(results: &[AssertionResult]) -> String {
    results
        .iter()
        .map(|r| {
            let mark = if r.passed() { "✓" } else { "✗" };
            format!("{mark} {} - {}", r.name, r.message)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_assertion_failures(failed: &[AssertionResult], total: usize) -> String {
    format!(
        "{} of {total} assertions failed:\n{}",
        failed.len(),
        indent_lines(&format_assertions(failed), 4)
    )
}
