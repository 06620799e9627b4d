use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use super::{child_mapping, read_yaml, str_at, write_yaml, XrPatcher};
use crate::suite::Patches;
use crate::{Result, XprinError};

/// Applies XRD `default:` values and connection-secret injection.
#[derive(Debug, Clone, Default)]
pub struct DefaultXrPatcher;

impl XrPatcher for DefaultXrPatcher {
    fn patch(
        &self,
        xr_path: &Path,
        patches: &Patches,
        xrd: Option<&Path>,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        patches.validate()?;
        let mut xr = read_yaml(xr_path)?;
        let fail = |reason: String| XprinError::Patch {
            path: xr_path.to_path_buf(),
            reason,
        };
        if !xr.is_mapping() {
            return Err(fail("composite is not a YAML mapping".into()));
        }

        if let Some(xrd_path) = xrd {
            let xrd_doc = read_yaml(xrd_path)?;
            let schema = select_schema(&xr, &xrd_doc).map_err(fail)?;
            apply_defaults(&mut xr, schema);
            debug!(xrd = %xrd_path.display(), "applied XRD defaults");
        }

        if patches.connection_secret_enabled() {
            let name = if patches.connection_secret_name.is_empty() {
                str_at(&xr, &["metadata", "name"])
                    .ok_or_else(|| fail("missing metadata.name".into()))?
                    .to_string()
            } else {
                patches.connection_secret_name.clone()
            };
            let namespace = if patches.connection_secret_namespace.is_empty() {
                "default".to_string()
            } else {
                patches.connection_secret_namespace.clone()
            };
            let spec = child_mapping(&mut xr, "spec").ok_or_else(|| fail("invalid spec".into()))?;
            let mut secret_ref = Mapping::new();
            secret_ref.insert("name".into(), Value::String(name));
            secret_ref.insert("namespace".into(), Value::String(namespace));
            spec.insert(
                "writeConnectionSecretToRef".into(),
                Value::Mapping(secret_ref),
            );
            debug!("injected connection secret reference");
        }

        let file_name = xr_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "xr.yaml".into());
        let target = out_dir.join(format!("patched-{file_name}"));
        write_yaml(&target, &xr)?;
        Ok(target)
    }
}

/// Finds the `openAPIV3Schema` of the XRD version matching the composite.
fn select_schema<'x>(xr: &Value, xrd: &'x Value) -> std::result::Result<&'x Value, String> {
    let xr_kind = str_at(xr, &["kind"]).unwrap_or_default();
    let xrd_kind = str_at(xrd, &["spec", "names", "kind"]).unwrap_or_default();
    if xr_kind != xrd_kind {
        return Err(format!(
            "XRD defines kind '{xrd_kind}' but the composite is '{xr_kind}'"
        ));
    }
    let wanted = str_at(xr, &["apiVersion"])
        .and_then(|v| v.rsplit('/').next())
        .unwrap_or_default();
    let versions = xrd
        .get("spec")
        .and_then(|s| s.get("versions"))
        .and_then(Value::as_sequence)
        .ok_or_else(|| "XRD has no spec.versions".to_string())?;
    let version = versions
        .iter()
        .find(|v| str_at(v, &["name"]) == Some(wanted))
        .or_else(|| {
            versions
                .iter()
                .find(|v| v.get("referenceable").and_then(Value::as_bool) == Some(true))
        })
        .or_else(|| versions.first())
        .ok_or_else(|| "XRD has no versions".to_string())?;
    version
        .get("schema")
        .and_then(|s| s.get("openAPIV3Schema"))
        .ok_or_else(|| "XRD version has no openAPIV3Schema".to_string())
}

/// Fills absent properties that declare a `default`, recursing into objects
/// and array items that are present.
fn apply_defaults(value: &mut Value, schema: &Value) {
    match value {
        Value::Mapping(map) => {
            let Some(properties) = schema.get("properties").and_then(Value::as_mapping) else {
                return;
            };
            for (key, prop_schema) in properties {
                if !map.contains_key(key) {
                    if let Some(default) = prop_schema.get("default") {
                        map.insert(key.clone(), default.clone());
                    }
                }
                if let Some(child) = map.get_mut(key) {
                    apply_defaults(child, prop_schema);
                }
            }
        }
        Value::Sequence(items) => {
            if let Some(item_schema) = schema.get("items") {
                for item in items {
                    apply_defaults(item, item_schema);
                }
            }
        }
        _ => {}
    }
}
