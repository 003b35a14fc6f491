use crate::constants::{APP_MANAGED_BY, HARNESS, LABEL_SESSION};
use crate::error::{self, Result};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use maplit::btreemap;
use snafu::OptionExt;
use std::collections::BTreeMap;

/// Defines a session namespace. The store appends a random suffix to `base_name`.
pub fn session_namespace(base_name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", base_name)),
            labels: Some(btreemap! {
                APP_MANAGED_BY.to_string() => HARNESS.to_string(),
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// The ownership boundary of one test session: the namespace every object lives in or, for
/// cluster-scoped objects, is owned by.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SessionScope {
    namespace: String,
    uid: String,
}

impl SessionScope {
    pub fn new<S1, S2>(namespace: S1, uid: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            namespace: namespace.into(),
            uid: uid.into(),
        }
    }

    /// Build the scope from a namespace as returned by the store, i.e. with its name and UID
    /// assigned.
    pub fn from_namespace(namespace: &Namespace) -> Result<Self> {
        let name = namespace
            .metadata
            .name
            .clone()
            .context(error::NamespaceIncompleteSnafu {
                namespace: namespace
                    .metadata
                    .generate_name
                    .clone()
                    .unwrap_or_default(),
                what: "name",
            })?;
        let uid = namespace
            .metadata
            .uid
            .clone()
            .context(error::NamespaceIncompleteSnafu {
                namespace: name.as_str(),
                what: "uid",
            })?;
        Ok(Self::new(name, uid))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Labels carried by every namespaced object of the session.
    pub fn labels(&self) -> BTreeMap<String, String> {
        btreemap! {
            LABEL_SESSION.to_string() => self.namespace.clone(),
            APP_MANAGED_BY.to_string() => HARNESS.to_string(),
        }
    }

    /// An owner reference to the session namespace so that the garbage collector removes
    /// cluster-scoped objects together with the namespace.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: "v1".to_string(),
            kind: "Namespace".to_string(),
            name: self.namespace.clone(),
            uid: self.uid.clone(),
            block_owner_deletion: Some(true),
            controller: Some(false),
        }
    }

    /// Metadata for an object living in the session namespace.
    pub(crate) fn namespaced_meta<S: Into<String>>(&self, name: S) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }

    /// Metadata for a cluster-scoped object owned by the session namespace.
    pub(crate) fn owned_meta<S: Into<String>>(&self, name: S) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            labels: Some(self.labels()),
            owner_references: Some(vec![self.owner_reference()]),
            ..Default::default()
        }
    }

    /// Label an externally defined cluster-scoped object and make the session namespace one of
    /// its owners. Existing labels and owners are kept.
    pub(crate) fn adopt(&self, meta: &mut ObjectMeta) {
        meta.labels
            .get_or_insert_with(BTreeMap::new)
            .extend(self.labels());
        let owners = meta.owner_references.get_or_insert_with(Vec::new);
        if !owners.iter().any(|owner| owner.uid == self.uid) {
            owners.push(self.owner_reference());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn namespace_uses_generated_name() {
        let ns = session_namespace("proxy-e2e");
        assert_eq!(ns.metadata.generate_name.as_deref(), Some("proxy-e2e-"));
        assert!(ns.metadata.name.is_none());
    }

    #[test]
    fn scope_requires_uid() {
        let mut ns = session_namespace("proxy-e2e");
        ns.metadata.name = Some("proxy-e2e-x1".to_string());
        assert!(SessionScope::from_namespace(&ns).is_err());
        ns.metadata.uid = Some("1234".to_string());
        let scope = SessionScope::from_namespace(&ns).unwrap();
        assert_eq!(scope.namespace(), "proxy-e2e-x1");
        assert_eq!(scope.uid(), "1234");
    }

    #[test]
    fn owner_reference_targets_namespace() {
        let owner = SessionScope::new("ns", "uid-1").owner_reference();
        assert_eq!(owner.api_version, "v1");
        assert_eq!(owner.kind, "Namespace");
        assert_eq!(owner.name, "ns");
        assert_eq!(owner.uid, "uid-1");
        assert_eq!(owner.block_owner_deletion, Some(true));
        assert_eq!(owner.controller, Some(false));
    }

    #[test]
    fn adopt_keeps_existing_metadata() {
        let scope = SessionScope::new("ns", "uid-1");
        let mut meta = ObjectMeta {
            name: Some("widgets.example.com".to_string()),
            labels: Some(btreemap! { "team".to_string() => "auth".to_string() }),
            ..Default::default()
        };
        scope.adopt(&mut meta);
        scope.adopt(&mut meta);
        let labels = meta.labels.unwrap();
        assert_eq!(labels.get("team").map(String::as_str), Some("auth"));
        assert_eq!(labels.get(LABEL_SESSION).map(String::as_str), Some("ns"));
        assert_eq!(meta.owner_references, Some(vec![scope.owner_reference()]));
    }
}
