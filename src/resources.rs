//! Rendered resource stream handling.
//!
//! The render tool prints a multi-document YAML stream. Each document becomes
//! a [`Resource`] identified by `Kind/name`.

use serde::Deserialize;
use serde_yaml::Value;

use crate::{Result, XprinError};

const COMPOSITION_RESOURCE_NAME: &str = "crossplane.io/composition-resource-name";

/// One document of the render output.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub kind: String,
    pub name: String,
    pub body: Value,
}

impl Resource {
    fn from_value(body: Value) -> Self {
        let kind = body
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let metadata = body.get("metadata");
        // Composed resources usually carry only generateName plus the
        // composition resource name annotation.
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .or_else(|| {
                metadata
                    .and_then(|m| m.get("annotations"))
                    .and_then(|a| a.get(COMPOSITION_RESOURCE_NAME))
                    .and_then(Value::as_str)
            })
            .or_else(|| {
                metadata
                    .and_then(|m| m.get("generateName"))
                    .and_then(Value::as_str)
            })
            .unwrap_or_default()
            .to_string();
        Self { kind, name, body }
    }

    /// `Kind/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }

    /// `rendered-<kind>-<name>.yaml`, lowercased and filesystem-safe.
    pub fn file_name(&self) -> String {
        format!(
            "rendered-{}-{}.yaml",
            sanitize(&self.kind.to_lowercase()),
            sanitize(&self.name)
        )
    }

    pub fn matches(&self, kind: &str, name: &str) -> bool {
        self.kind == kind && self.name == name
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.body).map_err(|e| XprinError::Yaml {
            path: self.key().into(),
            message: e.to_string(),
        })
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Parses a multi-document YAML stream, skipping empty documents.
pub fn parse_stream(text: &str) -> std::result::Result<Vec<Resource>, serde_yaml::Error> {
    let mut resources = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        resources.push(Resource::from_value(value));
    }
    Ok(resources)
}

/// Reads `kind` and `metadata.name` from a single-document YAML file body.
pub fn identify(text: &str) -> std::result::Result<(String, String), serde_yaml::Error> {
    let value: Value = serde_yaml::from_str(text)?;
    let r = Resource::from_value(value);
    Ok((r.kind, r.name))
}

/// Picks the composite resource out of the render output: the document
/// matching the input composite's kind and name, otherwise the first one.
pub fn extract_xr<'r>(resources: &'r [Resource], kind: &str, name: &str) -> Option<&'r Resource> {
    resources
        .iter()
        .find(|r| r.matches(kind, name))
        .or_else(|| resources.first())
}

/// Splits `Kind/name`; exactly one `/` with non-empty halves.
pub fn parse_resource_ref(reference: &str) -> Option<(&str, &str)> {
    let (kind, name) = reference.split_once('/')?;
    if kind.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((kind, name))
}
