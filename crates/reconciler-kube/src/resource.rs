//! Resource identity shared by the readiness probe and the update strategy resolver

use std::fmt;

use serde::{Deserialize, Serialize};

use reconciler_common::{Error, Result};

/// Identity of a single cluster resource
///
/// `namespace` is `None` for cluster-scoped resources. `api_version` is only
/// needed for generic (non-typed) reads.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    /// API version, e.g. "apps/v1"
    pub api_version: String,
    /// Resource kind, e.g. "Deployment"
    pub kind: String,
    /// Namespace of namespaced resources
    pub namespace: Option<String>,
    /// Resource name
    pub name: String,
}

impl ResourceRef {
    /// Create a namespaced resource identity
    pub fn namespaced(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Create a cluster-scoped resource identity
    pub fn cluster_scoped(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: None,
            name: name.into(),
        }
    }

    /// Namespace to use for typed namespaced reads
    pub fn namespace_or_default(&self) -> &str {
        self.namespace.as_deref().unwrap_or("default")
    }

    /// Parse the identity of a YAML or JSON manifest
    pub fn from_manifest(manifest: &str) -> Result<Self> {
        let value: serde_json::Value = serde_yaml::from_str(manifest)
            .map_err(|e| Error::serialization(format!("failed to parse manifest: {}", e)))?;
        Self::from_value(&value)
    }

    /// Extract the identity from an already-parsed manifest
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let field = |pointer: &str| value.pointer(pointer).and_then(|v| v.as_str());

        let kind = field("/kind")
            .ok_or_else(|| Error::serialization("manifest missing kind"))?
            .to_string();
        let api_version = field("/apiVersion")
            .ok_or_else(|| Error::serialization_for_kind(&kind, "manifest missing apiVersion"))?
            .to_string();
        let name = field("/metadata/name")
            .ok_or_else(|| Error::serialization_for_kind(&kind, "manifest missing metadata.name"))?
            .to_string();
        let namespace = field("/metadata/namespace").map(str::to_string);

        Ok(Self {
            api_version,
            kind,
            namespace,
            name,
        })
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}/{}", self.kind, namespace, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_manifest() {
        let manifest = r#"
apiVersion: apps/v1
kind: StatefulSet
metadata:
  name: postgresql
  namespace: kyma-system
spec:
  replicas: 1
"#;
        let resource = ResourceRef::from_manifest(manifest).unwrap();
        assert_eq!(
            resource,
            ResourceRef::namespaced("apps/v1", "StatefulSet", "kyma-system", "postgresql")
        );
        assert_eq!(resource.to_string(), "StatefulSet/kyma-system/postgresql");
    }

    #[test]
    fn test_from_json_manifest_cluster_scoped() {
        let manifest = r#"{"apiVersion":"v1","kind":"Namespace","metadata":{"name":"kpack"}}"#;
        let resource = ResourceRef::from_manifest(manifest).unwrap();
        assert_eq!(resource.namespace, None);
        assert_eq!(resource.namespace_or_default(), "default");
        assert_eq!(resource.to_string(), "Namespace/kpack");
    }

    #[test]
    fn test_missing_name_is_serialization_error() {
        let manifest = "apiVersion: v1\nkind: Pod\nmetadata: {}\n";
        let err = ResourceRef::from_manifest(manifest).unwrap_err();
        match err {
            Error::Serialization { kind, message } => {
                assert_eq!(kind.as_deref(), Some("Pod"));
                assert!(message.contains("metadata.name"));
            }
            other => panic!("Expected Serialization error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_kind() {
        assert!(ResourceRef::from_manifest("apiVersion: v1\n").is_err());
    }
}
