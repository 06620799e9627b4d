//! # Test Suite Data Model
//!
//! Types describing an xprin test suite file, plus the two operations that
//! act on a single test case before it is run: merging suite-level common
//! defaults and validating mandatory fields.
//!
//! A suite file looks like:
//! ```yaml
//! common:
//!   inputs:
//!     composition: composition.yaml
//!     functions: functions.yaml
//! tests:
//!   - name: "renders a bucket"
//!     id: bucket
//!     inputs:
//!       xr: xr.yaml
//!       crds: [crds/]
//!     hooks:
//!       pre-test:
//!         - name: "lint"
//!           run: "yamllint {{ .Inputs.XR }}"
//!     assertions:
//!       - name: "two resources"
//!         type: Count
//!         value: 2
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod loader;

pub use loader::{discover_suite_files, load_suite};

static TEST_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("test id pattern is valid"));

// =============================================================================
// SUITE
// =============================================================================

/// A parsed test suite file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    #[serde(default)]
    pub common: Option<Common>,
    #[serde(default)]
    pub tests: Vec<TestCase>,
}

/// Defaults applied to every test case in a suite that leaves a field unset.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Common {
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default)]
    pub patches: Patches,
    #[serde(default)]
    pub hooks: Hooks,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

impl TestSuite {
    /// Checks suite-wide invariants: test IDs are well-formed and unique.
    pub fn validate_ids(&self) -> crate::Result<()> {
        let mut seen = BTreeMap::new();
        let mut problems = Vec::new();
        for (index, case) in self.tests.iter().enumerate() {
            let Some(id) = case.id.as_deref() else {
                continue;
            };
            if !is_valid_test_id(id) {
                problems.push(format!(
                    "test case '{}' has invalid id '{id}': only letters, digits, '_' and '-' are allowed",
                    case.name
                ));
                continue;
            }
            if let Some(first) = seen.insert(id.to_string(), index) {
                problems.push(format!(
                    "duplicate test id '{id}' (test cases #{} and #{})",
                    first + 1,
                    index + 1
                ));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(crate::XprinError::config(problems.join("\n")))
        }
    }
}

/// Returns true when `id` only contains ASCII alphanumerics, `_` and `-`.
pub fn is_valid_test_id(id: &str) -> bool {
    TEST_ID_RE.is_match(id)
}

// =============================================================================
// TEST CASE
// =============================================================================

/// A single test case definition.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default)]
    pub patches: Patches,
    #[serde(default)]
    pub hooks: Hooks,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

impl TestCase {
    pub fn has_claim(&self) -> bool {
        !self.inputs.claim.is_empty()
    }

    pub fn has_xr(&self) -> bool {
        !self.inputs.xr.is_empty()
    }

    /// Display label used in logs and reports.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_deref().unwrap_or("<unnamed>")
        } else {
            &self.name
        }
    }

    /// Adopts every value from `common` that this test case leaves unset.
    /// Values supplied by the test case always win.
    pub fn merge_common(&mut self, common: &Common) {
        self.inputs.merge(&common.inputs);
        self.patches.merge(&common.patches);
        if self.hooks.pre_test.is_empty() {
            self.hooks.pre_test = common.hooks.pre_test.clone();
        }
        if self.hooks.post_test.is_empty() {
            self.hooks.post_test = common.hooks.post_test.clone();
        }
        if self.assertions.is_empty() {
            self.assertions = common.assertions.clone();
        }
    }

    /// Enforces mandatory fields and the claim/XR exclusivity rule.
    ///
    /// All violations are reported at once, newline-joined.
    pub fn validate(&self) -> crate::Result<()> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("name is required".to_string());
        }
        match (self.has_claim(), self.has_xr()) {
            (true, true) => problems.push("both claim and xr are set; only one is allowed".into()),
            (false, false) => problems.push("one of claim or xr must be set".into()),
            _ => {}
        }
        if self.inputs.composition.is_empty() {
            problems.push("composition is required".into());
        }
        if self.inputs.functions.is_empty() {
            problems.push("functions is required".into());
        }
        if let Err(e) = self.patches.validate() {
            problems.push(e.to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(crate::XprinError::config(format!(
                "invalid test case '{}':\n{}",
                self.label(),
                crate::errors::indent_lines(&problems.join("\n"), 2)
            )))
        }
    }
}

// =============================================================================
// INPUTS, PATCHES, HOOKS
// =============================================================================

/// Declared inputs of a test case. Paths start out suite-file-relative and are
/// rewritten in place to absolute paths and then to staged copies.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Inputs {
    #[serde(default)]
    pub xr: String,
    #[serde(default)]
    pub claim: String,
    #[serde(default)]
    pub composition: String,
    #[serde(default)]
    pub functions: String,
    #[serde(default)]
    pub crds: Vec<String>,
    #[serde(default)]
    pub context_files: BTreeMap<String, String>,
    #[serde(default)]
    pub context_values: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub observed_resources: String,
    #[serde(default)]
    pub extra_resources: String,
    #[serde(default)]
    pub function_credentials: String,
}

impl Inputs {
    fn merge(&mut self, common: &Inputs) {
        // A test case that picks its own composite must not inherit the other kind.
        if self.xr.is_empty() && self.claim.is_empty() {
            self.xr = common.xr.clone();
            self.claim = common.claim.clone();
        }
        merge_str(&mut self.composition, &common.composition);
        merge_str(&mut self.functions, &common.functions);
        if self.crds.is_empty() {
            self.crds = common.crds.clone();
        }
        if self.context_files.is_empty() {
            self.context_files = common.context_files.clone();
        }
        if self.context_values.is_empty() {
            self.context_values = common.context_values.clone();
        }
        merge_str(&mut self.observed_resources, &common.observed_resources);
        merge_str(&mut self.extra_resources, &common.extra_resources);
        merge_str(&mut self.function_credentials, &common.function_credentials);
    }
}

fn merge_str(target: &mut String, common: &str) {
    if target.is_empty() {
        *target = common.to_string();
    }
}

/// Optional transformations applied to the composite before rendering.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patches {
    #[serde(default)]
    pub xrd: String,
    #[serde(default)]
    pub connection_secret: Option<bool>,
    #[serde(default)]
    pub connection_secret_name: String,
    #[serde(default)]
    pub connection_secret_namespace: String,
}

impl Patches {
    /// True when any patch field is set.
    pub fn is_set(&self) -> bool {
        !self.xrd.is_empty() || self.connection_secret_enabled()
    }

    pub fn connection_secret_enabled(&self) -> bool {
        self.connection_secret == Some(true)
    }

    /// A secret name or namespace requires an explicit `connectionSecret`.
    /// `connectionSecret: false` keeps the values but leaves them inert.
    pub fn validate(&self) -> crate::Result<()> {
        let has_details =
            !self.connection_secret_name.is_empty() || !self.connection_secret_namespace.is_empty();
        if has_details && self.connection_secret.is_none() {
            return Err(crate::XprinError::config(
                "connectionSecretName/connectionSecretNamespace require connectionSecret: true",
            ));
        }
        Ok(())
    }

    fn merge(&mut self, common: &Patches) {
        merge_str(&mut self.xrd, &common.xrd);
        if self.connection_secret.is_none() {
            self.connection_secret = common.connection_secret;
        }
        merge_str(&mut self.connection_secret_name, &common.connection_secret_name);
        merge_str(
            &mut self.connection_secret_namespace,
            &common.connection_secret_namespace,
        );
    }
}

/// Ordered pre-test and post-test hook lists.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Hooks {
    #[serde(default, rename = "pre-test")]
    pub pre_test: Vec<Hook>,
    #[serde(default, rename = "post-test")]
    pub post_test: Vec<Hook>,
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.pre_test.is_empty() && self.post_test.is_empty()
    }
}

/// A shell command run before or after the render/validate/assert sequence.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Hook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub run: String,
}

impl Hook {
    /// The hook name when present, otherwise its command.
    pub fn label(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.run,
        }
    }
}

// =============================================================================
// ASSERTIONS AND OUTPUTS
// =============================================================================

/// A structural check against the rendered resources.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Assertion {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_yaml::Value>,
}

/// Files produced while running a test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Outputs {
    /// The full rendered multi-document stream.
    pub render: PathBuf,
    /// The composite resource extracted from the render output.
    pub xr: PathBuf,
    /// The validate tool's report; `None` when no CRDs were declared.
    pub validate: Option<PathBuf>,
    pub render_count: usize,
    /// `Kind/name` to the file holding that single resource.
    pub rendered: BTreeMap<String, PathBuf>,
}

impl Outputs {
    /// Re-roots every path under `from` so that it lives under `to`.
    pub fn rebase(&mut self, from: &std::path::Path, to: &std::path::Path) {
        let rebase = |p: &mut PathBuf| {
            if let Ok(rest) = p.strip_prefix(from) {
                *p = to.join(rest);
            }
        };
        rebase(&mut self.render);
        rebase(&mut self.xr);
        if let Some(v) = self.validate.as_mut() {
            rebase(v);
        }
        for path in self.rendered.values_mut() {
            rebase(path);
        }
    }
}
