//! # Assertion Evaluation
//!
//! Structural checks over the rendered resources of a test case. Every
//! assertion in a batch is evaluated even when earlier ones fail, so a single
//! run reports all of them.
//!
//! | type | fields | passes when |
//! |---|---|---|
//! | `Count` | `value` | number of rendered resources equals `value` |
//! | `Exists` | `resource` | a `Kind/name` resource was rendered |
//! | `NotExists` | `resource` | no such resource (`Kind` alone: none of that kind) |
//! | `FieldType` | `resource`, `field`, `value` | the field's type is `value` |
//! | `FieldExists` | `resource`, `field` | the field is present |
//! | `FieldNotExists` | `resource`, `field` | the field is absent |
//! | `FieldValue` | `resource`, `field`, `operator`, `value` | string forms are equal |

use serde::Serialize;
use serde_yaml::Value;
use tracing::debug;

use crate::resources::{parse_resource_ref, Resource};
use crate::suite::Assertion;
use crate::template::{self, TemplateContext};
use crate::Result;

// =============================================================================
// RESULTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssertionStatus {
    Pass,
    Fail,
}

/// Outcome of a single assertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssertionResult {
    pub name: String,
    pub kind: String,
    pub status: AssertionStatus,
    pub message: String,
}

impl AssertionResult {
    fn pass(assertion: &Assertion, message: impl Into<String>) -> Self {
        Self::new(assertion, AssertionStatus::Pass, message.into())
    }

    fn fail(assertion: &Assertion, message: impl Into<String>) -> Self {
        Self::new(assertion, AssertionStatus::Fail, message.into())
    }

    fn new(assertion: &Assertion, status: AssertionStatus, message: String) -> Self {
        let name = if assertion.name.is_empty() {
            format!("{} assertion", assertion.kind)
        } else {
            assertion.name.clone()
        };
        Self {
            name,
            kind: assertion.kind.clone(),
            status,
            message,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == AssertionStatus::Pass
    }
}

// =============================================================================
// TEMPLATING
// =============================================================================

/// Resolves template tokens in each assertion's name, resource, field and
/// value. A templated value takes the YAML type it renders to.
pub fn render_assertions(
    assertions: &[Assertion],
    ctx: &TemplateContext<'_>,
) -> Result<Vec<Assertion>> {
    assertions
        .iter()
        .map(|a| {
            let mut a = a.clone();
            a.name = template::resolve(&a.name, ctx)?;
            if let Some(resource) = a.resource.as_mut() {
                *resource = template::resolve(resource, ctx)?;
            }
            if let Some(field) = a.field.as_mut() {
                *field = template::resolve(field, ctx)?;
            }
            if let Some(value) = a.value.take() {
                a.value = Some(template::resolve_value(value, ctx)?);
            }
            Ok(a)
        })
        .collect()
}

// =============================================================================
// EXECUTOR
// =============================================================================

/// Evaluates assertions against a set of rendered resources.
pub struct AssertionExecutor<'r> {
    resources: &'r [Resource],
}

impl<'r> AssertionExecutor<'r> {
    pub fn new(resources: &'r [Resource]) -> Self {
        Self { resources }
    }

    /// Returns every result and, separately, the failed ones.
    pub fn evaluate(
        &self,
        assertions: &[Assertion],
    ) -> (Vec<AssertionResult>, Vec<AssertionResult>) {
        let all: Vec<AssertionResult> = assertions.iter().map(|a| self.evaluate_one(a)).collect();
        let failed = all.iter().filter(|r| !r.passed()).cloned().collect();
        (all, failed)
    }

    fn evaluate_one(&self, assertion: &Assertion) -> AssertionResult {
        let result = match assertion.kind.as_str() {
            "Count" => self.count(assertion),
            "Exists" => self.exists(assertion),
            "NotExists" => self.not_exists(assertion),
            "FieldType" => self.field_type(assertion),
            "FieldExists" => self.field_exists(assertion, true),
            "FieldNotExists" => self.field_exists(assertion, false),
            "FieldValue" => self.field_value(assertion),
            other => AssertionResult::fail(
                assertion,
                format!("unsupported assertion type '{other}'"),
            ),
        };
        debug!(name = %result.name, status = ?result.status, "assertion evaluated");
        result
    }

    fn count(&self, a: &Assertion) -> AssertionResult {
        let actual = self.resources.len();
        let Some(Value::Number(expected)) = a.value.as_ref() else {
            return AssertionResult::fail(a, "Count assertion requires a numeric value");
        };
        let matches = match expected.as_u64() {
            Some(n) => n == actual as u64,
            None => expected.as_f64().is_some_and(|f| f == actual as f64),
        };
        if matches {
            AssertionResult::pass(a, format!("found {actual} resources (as expected)"))
        } else {
            AssertionResult::fail(a, format!("expected {expected} resources, got {actual}"))
        }
    }

    fn exists(&self, a: &Assertion) -> AssertionResult {
        let reference = a.resource.as_deref().unwrap_or_default();
        let Some((kind, name)) = parse_resource_ref(reference) else {
            return invalid_resource(a, reference);
        };
        if self.find(kind, name).is_some() {
            AssertionResult::pass(a, format!("resource {kind}/{name} found"))
        } else {
            AssertionResult::fail(a, format!("resource {kind}/{name} not found"))
        }
    }

    fn not_exists(&self, a: &Assertion) -> AssertionResult {
        let reference = a.resource.as_deref().unwrap_or_default();
        if !reference.is_empty() && !reference.contains('/') {
            let kind = reference;
            return match self.resources.iter().find(|r| r.kind == kind) {
                Some(r) => AssertionResult::fail(
                    a,
                    format!("found resource of kind {kind} ({})", r.key()),
                ),
                None => AssertionResult::pass(a, format!("no resource of kind {kind} found")),
            };
        }
        let Some((kind, name)) = parse_resource_ref(reference) else {
            return invalid_resource(a, reference);
        };
        if self.find(kind, name).is_some() {
            AssertionResult::fail(a, format!("resource {kind}/{name} found"))
        } else {
            AssertionResult::pass(a, format!("resource {kind}/{name} not found (as expected)"))
        }
    }

    fn field_type(&self, a: &Assertion) -> AssertionResult {
        let expected = match a.value.as_ref() {
            Some(Value::String(s)) => s.as_str(),
            _ => return AssertionResult::fail(a, "FieldType assertion requires a string value"),
        };
        let (field, value) = match self.resolve_field(a) {
            Ok((field, Some(value))) => (field, value),
            Ok((field, None)) => return AssertionResult::fail(a, format!("field {field} not found")),
            Err(msg) => return AssertionResult::fail(a, msg),
        };
        let actual = type_name(value);
        if actual == expected {
            AssertionResult::pass(a, format!("field {field} is {actual}"))
        } else {
            AssertionResult::fail(a, format!("field {field} is {actual}, expected {expected}"))
        }
    }

    fn field_exists(&self, a: &Assertion, want_present: bool) -> AssertionResult {
        match (self.resolve_field(a), want_present) {
            (Err(msg), _) => AssertionResult::fail(a, msg),
            (Ok((field, Some(_))), true) => {
                AssertionResult::pass(a, format!("field {field} exists"))
            }
            (Ok((field, None)), true) => AssertionResult::fail(a, format!("field {field} not found")),
            (Ok((field, Some(_))), false) => {
                AssertionResult::fail(a, format!("field {field} exists"))
            }
            (Ok((field, None)), false) => {
                AssertionResult::pass(a, format!("field {field} does not exist (as expected)"))
            }
        }
    }

    fn field_value(&self, a: &Assertion) -> AssertionResult {
        let Some(operator) = a.operator.as_deref().filter(|o| !o.is_empty()) else {
            return AssertionResult::fail(a, "FieldValue assertion requires an operator");
        };
        let Some(expected) = a.value.as_ref() else {
            return AssertionResult::fail(a, "FieldValue assertion requires a value");
        };
        if operator != "==" && operator != "is" {
            return AssertionResult::fail(a, format!("unsupported operator '{operator}'"));
        }
        let (field, actual) = match self.resolve_field(a) {
            Ok((field, Some(value))) => (field, value),
            Ok((field, None)) => return AssertionResult::fail(a, format!("field {field} not found")),
            Err(msg) => return AssertionResult::fail(a, msg),
        };
        let actual = display_value(actual);
        let expected = display_value(expected);
        if actual == expected {
            AssertionResult::pass(a, format!("field {field} is '{actual}'"))
        } else {
            AssertionResult::fail(
                a,
                format!("field {field} is '{actual}', expected '{expected}'"),
            )
        }
    }

    fn find(&self, kind: &str, name: &str) -> Option<&'r Resource> {
        self.resources.iter().find(|r| r.matches(kind, name))
    }

    /// Locates the named resource and walks its dot-path field.
    fn resolve_field<'a>(
        &self,
        a: &'a Assertion,
    ) -> std::result::Result<(&'a str, Option<&'r Value>), String> {
        let reference = a.resource.as_deref().unwrap_or_default();
        let (kind, name) = parse_resource_ref(reference)
            .ok_or_else(|| format!("invalid resource '{reference}': expected Kind/name"))?;
        let field = a
            .field
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| format!("{} assertion requires a field", a.kind))?;
        let resource = self
            .find(kind, name)
            .ok_or_else(|| format!("resource {kind}/{name} not found"))?;
        Ok((field, lookup_field(&resource.body, field)?))
    }
}

fn invalid_resource(a: &Assertion, reference: &str) -> AssertionResult {
    AssertionResult::fail(
        a,
        format!("invalid resource '{reference}': expected Kind/name"),
    )
}

/// Walks `path` through nested mappings. A missing key yields `None`; an
/// intermediate value that is not a mapping is an error.
fn lookup_field<'v>(body: &'v Value, path: &str) -> std::result::Result<Option<&'v Value>, String> {
    let mut current = body;
    let mut walked: Vec<&str> = Vec::new();
    for segment in path.split('.') {
        let Value::Mapping(map) = untag(current) else {
            return Err(format!(
                "field {path}: {} is not an object",
                if walked.is_empty() {
                    "resource".to_string()
                } else {
                    walked.join(".")
                }
            ));
        };
        match map.get(segment) {
            Some(next) => current = next,
            None => return Ok(None),
        }
        walked.push(segment);
    }
    Ok(Some(current))
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn type_name(value: &Value) -> &'static str {
    match untag(value) {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Sequence(_) => "array",
        Value::Mapping(_) => "object",
        Value::Null => "null",
        Value::Tagged(_) => unreachable!("untag strips tags"),
    }
}

fn display_value(value: &Value) -> String {
    match untag(value) {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other)
            .or_else(|_| serde_yaml::to_string(other).map(|s| s.trim_end().to_string()))
            .unwrap_or_default(),
    }
}
