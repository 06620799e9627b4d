//! # Template Rendering
//!
//! Evaluates `{{ ... }}` expressions found in test case fields and hook
//! commands against a [`TemplateContext`].
//!
//! ## Expressions
//!
//! - `{{ .Repositories.<name> }}`
//! - `{{ .Inputs.<Field> }}`
//! - `{{ .Outputs.<Field> }}`
//! - `{{ .Tests.<id>.Outputs.<Field> }}`
//! - `{{ index .Outputs.Rendered "Kind/name" }}` for keys that are not
//!   identifiers
//!
//! Lookups are strict: an unknown key anywhere in a path fails the render
//! instead of producing empty output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::runner::result::CompletedTests;
use crate::suite::{Inputs, Outputs};
use crate::{Result, XprinError};

pub mod placeholder;

static EXPRESSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("expression pattern is valid"));

// =============================================================================
// CONTEXT
// =============================================================================

/// Read-only data visible to template expressions.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub repositories: &'a BTreeMap<String, PathBuf>,
    pub inputs: &'a Inputs,
    /// `None` until rendering has completed.
    pub outputs: Option<&'a Outputs>,
    pub tests: &'a CompletedTests,
}

impl<'a> TemplateContext<'a> {
    pub fn new(
        repositories: &'a BTreeMap<String, PathBuf>,
        inputs: &'a Inputs,
        outputs: Option<&'a Outputs>,
        tests: &'a CompletedTests,
    ) -> Self {
        Self {
            repositories,
            inputs,
            outputs,
            tests,
        }
    }

    fn to_value(self) -> Value {
        let mut root = Map::new();
        root.insert(
            "Repositories".into(),
            Value::Object(
                self.repositories
                    .iter()
                    .map(|(k, v)| (k.clone(), path_value(v)))
                    .collect(),
            ),
        );
        root.insert("Inputs".into(), inputs_value(self.inputs));
        root.insert(
            "Outputs".into(),
            self.outputs.map_or(Value::Null, outputs_value),
        );
        let tests = self
            .tests
            .iter()
            .map(|(id, result)| {
                let mut entry = Map::new();
                entry.insert("Name".into(), Value::String(result.name.clone()));
                entry.insert(
                    "Outputs".into(),
                    result.outputs.as_ref().map_or(Value::Null, outputs_value),
                );
                (id.clone(), Value::Object(entry))
            })
            .collect();
        root.insert("Tests".into(), Value::Object(tests));
        Value::Object(root)
    }
}

fn path_value(path: &Path) -> Value {
    Value::String(path.display().to_string())
}

fn inputs_value(inputs: &Inputs) -> Value {
    let mut m = Map::new();
    m.insert("XR".into(), Value::String(inputs.xr.clone()));
    m.insert("Claim".into(), Value::String(inputs.claim.clone()));
    m.insert("Composition".into(), Value::String(inputs.composition.clone()));
    m.insert("Functions".into(), Value::String(inputs.functions.clone()));
    m.insert(
        "CRDs".into(),
        Value::Array(inputs.crds.iter().cloned().map(Value::String).collect()),
    );
    m.insert(
        "ContextFiles".into(),
        Value::Object(
            inputs
                .context_files
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        ),
    );
    m.insert(
        "ContextValues".into(),
        Value::Object(
            inputs
                .context_values
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
                .collect(),
        ),
    );
    m.insert(
        "ObservedResources".into(),
        Value::String(inputs.observed_resources.clone()),
    );
    m.insert(
        "ExtraResources".into(),
        Value::String(inputs.extra_resources.clone()),
    );
    m.insert(
        "FunctionCredentials".into(),
        Value::String(inputs.function_credentials.clone()),
    );
    Value::Object(m)
}

fn outputs_value(outputs: &Outputs) -> Value {
    let mut m = Map::new();
    m.insert("Render".into(), path_value(&outputs.render));
    m.insert("XR".into(), path_value(&outputs.xr));
    m.insert(
        "Validate".into(),
        outputs.validate.as_deref().map_or(Value::Null, path_value),
    );
    m.insert("RenderCount".into(), Value::from(outputs.render_count));
    m.insert(
        "Rendered".into(),
        Value::Object(
            outputs
                .rendered
                .iter()
                .map(|(k, v)| (k.clone(), path_value(v)))
                .collect(),
        ),
    );
    Value::Object(m)
}

// =============================================================================
// RENDERING
// =============================================================================

/// Evaluates every `{{ expr }}` in `text`.
pub fn render(text: &str, ctx: &TemplateContext<'_>) -> Result<String> {
    if !text.contains("{{") {
        return Ok(text.to_string());
    }
    let root = ctx.to_value();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in EXPRESSION_RE.captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always matches");
        out.push_str(&text[last..whole.start()]);
        out.push_str(&evaluate(&caps[1], &root)?);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Decodes placeholder tokens in `text` and renders the result.
pub fn resolve(text: &str, ctx: &TemplateContext<'_>) -> Result<String> {
    if !placeholder::contains_tokens(text) {
        return Ok(text.to_string());
    }
    render(&placeholder::decode(text), ctx)
}

/// Walks a structured value and resolves every string carrying tokens.
///
/// A rendered string that reads as a YAML number or boolean takes that type,
/// so `value: {{ .Tests.base.Outputs.RenderCount }}` yields an integer.
pub fn resolve_value(value: serde_yaml::Value, ctx: &TemplateContext<'_>) -> Result<serde_yaml::Value> {
    walk(value, ctx, true)
}

/// Like [`resolve_value`] but rendered strings stay strings. Used where the
/// target field is text whatever the expression produced.
pub fn resolve_strings(value: serde_yaml::Value, ctx: &TemplateContext<'_>) -> Result<serde_yaml::Value> {
    walk(value, ctx, false)
}

fn walk(value: serde_yaml::Value, ctx: &TemplateContext<'_>, infer: bool) -> Result<serde_yaml::Value> {
    use serde_yaml::Value as Y;
    Ok(match value {
        Y::String(s) if placeholder::contains_tokens(&s) => {
            let rendered = resolve(&s, ctx)?;
            if infer {
                typed_scalar(rendered)
            } else {
                Y::String(rendered)
            }
        }
        Y::Sequence(items) => Y::Sequence(
            items
                .into_iter()
                .map(|v| walk(v, ctx, infer))
                .collect::<Result<_>>()?,
        ),
        Y::Mapping(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k, walk(v, ctx, infer)?);
            }
            Y::Mapping(out)
        }
        Y::Tagged(mut tagged) => {
            tagged.value = walk(tagged.value, ctx, infer)?;
            Y::Tagged(tagged)
        }
        other => other,
    })
}

fn typed_scalar(rendered: String) -> serde_yaml::Value {
    match serde_yaml::from_str::<serde_yaml::Value>(&rendered) {
        Ok(v @ (serde_yaml::Value::Number(_) | serde_yaml::Value::Bool(_))) => v,
        _ => serde_yaml::Value::String(rendered),
    }
}

fn evaluate(raw: &str, root: &Value) -> Result<String> {
    let expr = raw
        .trim()
        .trim_start_matches('-')
        .trim_end_matches('-')
        .trim();
    if expr.is_empty() {
        return Err(XprinError::template("empty expression"));
    }
    let value = if let Some(rest) = expr.strip_prefix("index ") {
        let args = split_args(rest)?;
        let (path, keys) = args
            .split_first()
            .ok_or_else(|| XprinError::template(format!("'{expr}': index needs a target")))?;
        if keys.is_empty() {
            return Err(XprinError::template(format!(
                "'{expr}': index needs at least one key"
            )));
        }
        let mut current = lookup_path(path, root, expr)?;
        for key in keys {
            current = step(current, key, expr)?;
        }
        current
    } else {
        lookup_path(expr, root, expr)?
    };
    Ok(format_value(value))
}

fn lookup_path<'v>(path: &str, root: &'v Value, expr: &str) -> Result<&'v Value> {
    let Some(rest) = path.strip_prefix('.') else {
        return Err(XprinError::template(format!(
            "'{expr}': expected a field path starting with '.'"
        )));
    };
    if rest.is_empty() {
        return Err(XprinError::template(format!(
            "'{expr}': the root context cannot be printed"
        )));
    }
    let mut current = root;
    let mut walked = String::new();
    for segment in rest.split('.') {
        if segment.is_empty() {
            return Err(XprinError::template(format!("'{expr}': empty path segment")));
        }
        if current.is_null() {
            return Err(XprinError::template(format!(
                "'{expr}': {walked} is not available at this stage"
            )));
        }
        current = step(current, segment, expr)?;
        walked.push('.');
        walked.push_str(segment);
    }
    Ok(current)
}

fn step<'v>(current: &'v Value, key: &str, expr: &str) -> Result<&'v Value> {
    match current {
        Value::Object(map) => map.get(key).ok_or_else(|| {
            XprinError::template(format!("'{expr}': map has no entry for key \"{key}\""))
        }),
        Value::Array(items) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .ok_or_else(|| XprinError::template(format!("'{expr}': index {key} out of range"))),
        Value::Null => Err(XprinError::template(format!(
            "'{expr}': cannot look up \"{key}\" in an unset value"
        ))),
        _ => Err(XprinError::template(format!(
            "'{expr}': cannot look up \"{key}\" in a scalar value"
        ))),
    }
}

fn split_args(rest: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut chars = rest.trim().chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut arg = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            arg.push(escaped);
                        }
                    }
                    c => arg.push(c),
                }
            }
            if !closed {
                return Err(XprinError::template(format!("unterminated string in '{rest}'")));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                arg.push(c);
                chars.next();
            }
        }
        args.push(arg);
    }
    Ok(args)
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(format_value).collect::<Vec<_>>().join(" ")
        ),
        Value::Object(map) => format!(
            "map[{}]",
            map.iter()
                .map(|(k, v)| format!("{k}:{}", format_value(v)))
                .collect::<Vec<_>>()
                .join(" ")
        ),
    }
}
