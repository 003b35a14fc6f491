/*!

Custom resource definitions are authored outside of this crate and read from disk. Decoding happens
before any remote call so that a malformed declaration fails fast.

!*/

use crate::error::{self, Result};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use snafu::{ensure, ResultExt};
use std::path::Path;

/// Decode a custom resource definition from YAML. `path` is only used for error messages.
pub fn decode_crd(yaml: &str, path: &Path) -> Result<CustomResourceDefinition> {
    let crd: CustomResourceDefinition =
        serde_yaml::from_str(yaml).context(error::CrdDecodeSnafu { path })?;
    ensure!(
        crd.metadata
            .name
            .as_deref()
            .map(|name| !name.is_empty())
            .unwrap_or_default(),
        error::CrdNameMissingSnafu { path }
    );
    Ok(crd)
}

/// Read and decode the custom resource definition declared in `path`.
pub async fn read_crd<P: AsRef<Path>>(path: P) -> Result<CustomResourceDefinition> {
    let path = path.as_ref();
    let yaml = tokio::fs::read_to_string(path)
        .await
        .context(error::FileSnafu { path })?;
    decode_crd(&yaml, path)
}

/// The name recorded in a decoded definition.
pub fn crd_name(crd: &CustomResourceDefinition) -> &str {
    crd.metadata.name.as_deref().unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::io::Write;

    pub(crate) const CRD_YAML: &str = r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: capiroles.rbac.platformengineers.io
spec:
  group: rbac.platformengineers.io
  names:
    kind: CAPIRole
    listKind: CAPIRoleList
    plural: capiroles
    singular: capirole
  scope: Namespaced
  versions:
    - name: v1
      served: true
      storage: true
      schema:
        openAPIV3Schema:
          type: object
          x-kubernetes-preserve-unknown-fields: true
"#;

    #[test]
    fn decodes_name() {
        let crd = decode_crd(CRD_YAML, Path::new("inline")).unwrap();
        assert_eq!(crd_name(&crd), "capiroles.rbac.platformengineers.io");
        assert_eq!(crd.spec.group, "rbac.platformengineers.io");
    }

    #[test]
    fn rejects_missing_name() {
        let yaml = CRD_YAML.replace(
            "  name: capiroles.rbac.platformengineers.io\n",
            "  labels: {}\n",
        );
        let err = decode_crd(&yaml, Path::new("unnamed.yaml")).unwrap_err();
        assert!(err.to_string().contains("has no name"), "{}", err);
    }

    #[test]
    fn rejects_other_kinds() {
        let yaml = CRD_YAML.replace("kind: CustomResourceDefinition", "kind: ConfigMap");
        assert!(decode_crd(&yaml, Path::new("configmap.yaml")).is_err());
    }

    #[tokio::test]
    async fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CRD_YAML.as_bytes()).unwrap();
        let crd = read_crd(file.path()).await.unwrap();
        assert_eq!(crd_name(&crd), "capiroles.rbac.platformengineers.io");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        assert!(read_crd("/does/not/exist.yaml").await.is_err());
    }
}
