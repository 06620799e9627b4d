//! Pre-test and post-test hook execution.
//!
//! Hooks of one phase run in order and stop at the first failure; the results
//! gathered up to that point are returned together with a single error.

use std::fmt;
use std::path::Path;

use tracing::{debug, info};

use crate::errors::indent_lines;
use crate::runner::command::{CommandRunner, Invocation};
use crate::runner::result::HookResult;
use crate::suite::Hook;
use crate::template::{self, TemplateContext};
use crate::XprinError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreTest,
    PostTest,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPhase::PreTest => "pre-test",
            HookPhase::PostTest => "post-test",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs hook commands through `sh -c` from a fixed working directory.
pub struct HookExecutor<'a> {
    runner: &'a dyn CommandRunner,
    workdir: &'a Path,
}

impl<'a> HookExecutor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, workdir: &'a Path) -> Self {
        Self { runner, workdir }
    }

    pub fn run(
        &self,
        hooks: &[Hook],
        phase: HookPhase,
        ctx: &TemplateContext<'_>,
    ) -> (Vec<HookResult>, Option<XprinError>) {
        let mut results = Vec::with_capacity(hooks.len());
        for hook in hooks {
            info!(phase = %phase, hook = %template_label(hook), "running hook");
            let mut result = HookResult {
                name: hook.name.clone(),
                command: template::placeholder::decode(&hook.run),
                output: String::new(),
                error: None,
            };

            let command = match template::resolve(&hook.run, ctx) {
                Ok(command) => command,
                Err(e) => {
                    let message = format!(
                        "{phase} hook '{}' failed to render: {e}",
                        template_label(hook)
                    );
                    result.error = Some(e.to_string());
                    results.push(result);
                    return (results, Some(XprinError::Hook { message }));
                }
            };

            let invocation = Invocation::shell(&command).current_dir(self.workdir);
            let output = match self.runner.run(&invocation) {
                Ok(output) => output,
                Err(e) => {
                    let message = format!(
                        "{phase} hook '{}' could not be run: {e}",
                        template_label(hook)
                    );
                    result.error = Some(e.to_string());
                    results.push(result);
                    return (results, Some(XprinError::Hook { message }));
                }
            };

            result.output = output.combined();
            if !output.success() {
                let mut message = format!(
                    "{phase} hook '{}' failed with exit code {}",
                    template_label(hook),
                    output.code()
                );
                let body = result.output.trim();
                if !body.is_empty() {
                    message.push_str(":\n");
                    message.push_str(&indent_lines(body, 4));
                }
                result.error = Some(format!("exit code {}", output.code()));
                results.push(result);
                return (results, Some(XprinError::Hook { message }));
            }
            debug!(phase = %phase, hook = %template_label(hook), "hook succeeded");
            results.push(result);
        }
        (results, None)
    }
}

/// Hook label with any placeholder tokens turned back into expressions.
fn template_label(hook: &Hook) -> String {
    template::placeholder::decode(hook.label())
}

/// Human-readable summary of hook results for the report.
pub fn format_results(results: &[HookResult]) -> String {
    let mut out = Vec::new();
    for r in results {
        let label = template::placeholder::decode(r.label());
        match &r.error {
            None => out.push(format!("✓ {label}")),
            Some(err) => out.push(format!("✗ {label} ({err})")),
        }
        let body = r.output.trim();
        if !body.is_empty() {
            out.push(indent_lines(body, 4));
        }
    }
    out.join("\n")
}
