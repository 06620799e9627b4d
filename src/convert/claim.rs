use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use super::{child_mapping, read_yaml, str_at, write_yaml, ClaimConverter};
use crate::{Result, XprinError};

const CLAIM_NAME_LABEL: &str = "crossplane.io/claim-name";
const CLAIM_NAMESPACE_LABEL: &str = "crossplane.io/claim-namespace";

/// Builds the composite a claim would bind to: same group/version, kind
/// prefixed with `X`, cluster-scoped, with `spec.claimRef` pointing back at
/// the claim.
#[derive(Debug, Clone, Default)]
pub struct DefaultClaimConverter;

impl ClaimConverter for DefaultClaimConverter {
    fn convert(&self, claim: &Path, out_dir: &Path) -> Result<PathBuf> {
        let doc = read_yaml(claim)?;
        let fail = |reason: &str| XprinError::Convert {
            path: claim.to_path_buf(),
            reason: reason.to_string(),
        };
        if !doc.is_mapping() {
            return Err(fail("claim is not a YAML mapping"));
        }
        let api_version = str_at(&doc, &["apiVersion"])
            .ok_or_else(|| fail("missing apiVersion"))?
            .to_string();
        let kind = str_at(&doc, &["kind"])
            .ok_or_else(|| fail("missing kind"))?
            .to_string();
        let name = str_at(&doc, &["metadata", "name"])
            .ok_or_else(|| fail("missing metadata.name"))?
            .to_string();
        let namespace = str_at(&doc, &["metadata", "namespace"])
            .unwrap_or("default")
            .to_string();

        let mut xr = doc.clone();
        xr["kind"] = Value::String(format!("X{kind}"));

        let metadata = child_mapping(&mut xr, "metadata").ok_or_else(|| fail("invalid metadata"))?;
        metadata.remove("namespace");
        let labels = metadata
            .entry(Value::String("labels".into()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if let Some(labels) = labels.as_mapping_mut() {
            labels.insert(CLAIM_NAME_LABEL.into(), Value::String(name.clone()));
            labels.insert(CLAIM_NAMESPACE_LABEL.into(), Value::String(namespace.clone()));
        }

        let spec = child_mapping(&mut xr, "spec").ok_or_else(|| fail("invalid spec"))?;
        let mut claim_ref = Mapping::new();
        claim_ref.insert("apiVersion".into(), Value::String(api_version));
        claim_ref.insert("kind".into(), Value::String(kind));
        claim_ref.insert("name".into(), Value::String(name));
        claim_ref.insert("namespace".into(), Value::String(namespace.clone()));
        spec.insert("claimRef".into(), Value::Mapping(claim_ref));
        // Claims reference secrets in their own namespace; composites need it spelled out.
        if let Some(secret_ref) = spec
            .get_mut("writeConnectionSecretToRef")
            .and_then(Value::as_mapping_mut)
        {
            if !secret_ref.contains_key("namespace") {
                secret_ref.insert("namespace".into(), Value::String(namespace));
            }
        }

        let target = out_dir.join("xr-from-claim.yaml");
        write_yaml(&target, &xr)?;
        debug!(claim = %claim.display(), xr = %target.display(), "converted claim");
        Ok(target)
    }
}
