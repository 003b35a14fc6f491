use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::fmt::{Display, Formatter};

/// The order in which objects are submitted. An object may only reference objects of a lower
/// rank, so submitting in ascending rank order never creates a dangling reference.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Rank {
    Scope,
    Schema,
    Config,
    Identity,
    Access,
    Network,
    Workload,
}

/// The kinds of object the harness creates.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ObjectKind {
    Namespace,
    CustomResourceDefinition,
    Secret,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    Role,
    RoleBinding,
    Service,
    Deployment,
}

impl ObjectKind {
    pub fn rank(self) -> Rank {
        match self {
            ObjectKind::Namespace => Rank::Scope,
            ObjectKind::CustomResourceDefinition => Rank::Schema,
            ObjectKind::Secret => Rank::Config,
            ObjectKind::ServiceAccount => Rank::Identity,
            ObjectKind::ClusterRole
            | ObjectKind::ClusterRoleBinding
            | ObjectKind::Role
            | ObjectKind::RoleBinding => Rank::Access,
            ObjectKind::Service => Rank::Network,
            ObjectKind::Deployment => Rank::Workload,
        }
    }

    /// `false` for cluster-scoped kinds, which a namespace deletion does not reach.
    pub fn is_namespaced(self) -> bool {
        !matches!(
            self,
            ObjectKind::Namespace
                | ObjectKind::CustomResourceDefinition
                | ObjectKind::ClusterRole
                | ObjectKind::ClusterRoleBinding
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Namespace => "Namespace",
            ObjectKind::CustomResourceDefinition => "CustomResourceDefinition",
            ObjectKind::Secret => "Secret",
            ObjectKind::ServiceAccount => "ServiceAccount",
            ObjectKind::ClusterRole => "ClusterRole",
            ObjectKind::ClusterRoleBinding => "ClusterRoleBinding",
            ObjectKind::Role => "Role",
            ObjectKind::RoleBinding => "RoleBinding",
            ObjectKind::Service => "Service",
            ObjectKind::Deployment => "Deployment",
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies an object in the remote store.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub name: String,
    pub namespace: Option<String>,
}

impl ObjectRef {
    pub fn namespaced<S1, S2>(kind: ObjectKind, namespace: S1, name: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            kind,
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    pub fn cluster<S: Into<String>>(kind: ObjectKind, name: S) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: None,
        }
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{} '{}/{}'", self.kind, namespace, self.name),
            None => write!(f, "{} '{}'", self.kind, self.name),
        }
    }
}

/// One object of any of the kinds the harness manages.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Namespace(Namespace),
    CustomResourceDefinition(CustomResourceDefinition),
    Secret(Secret),
    ServiceAccount(ServiceAccount),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    Role(Role),
    RoleBinding(RoleBinding),
    Service(Service),
    Deployment(Deployment),
}

/// Evaluates `$body` with `$inner` bound to the concrete object held by `$object`.
macro_rules! with_inner {
    ($object:expr, $inner:ident => $body:expr) => {
        match $object {
            Object::Namespace($inner) => $body,
            Object::CustomResourceDefinition($inner) => $body,
            Object::Secret($inner) => $body,
            Object::ServiceAccount($inner) => $body,
            Object::ClusterRole($inner) => $body,
            Object::ClusterRoleBinding($inner) => $body,
            Object::Role($inner) => $body,
            Object::RoleBinding($inner) => $body,
            Object::Service($inner) => $body,
            Object::Deployment($inner) => $body,
        }
    };
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Namespace(_) => ObjectKind::Namespace,
            Object::CustomResourceDefinition(_) => ObjectKind::CustomResourceDefinition,
            Object::Secret(_) => ObjectKind::Secret,
            Object::ServiceAccount(_) => ObjectKind::ServiceAccount,
            Object::ClusterRole(_) => ObjectKind::ClusterRole,
            Object::ClusterRoleBinding(_) => ObjectKind::ClusterRoleBinding,
            Object::Role(_) => ObjectKind::Role,
            Object::RoleBinding(_) => ObjectKind::RoleBinding,
            Object::Service(_) => ObjectKind::Service,
            Object::Deployment(_) => ObjectKind::Deployment,
        }
    }

    pub fn rank(&self) -> Rank {
        self.kind().rank()
    }

    pub fn meta(&self) -> &ObjectMeta {
        with_inner!(self, inner => inner.meta())
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        with_inner!(self, inner => inner.meta_mut())
    }

    /// The object's name, or its `generateName` prefix if the store has not assigned one yet.
    pub fn name(&self) -> String {
        let meta = self.meta();
        meta.name
            .clone()
            .or_else(|| meta.generate_name.clone())
            .unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<String> {
        if self.kind().is_namespaced() {
            self.meta().namespace.clone()
        } else {
            None
        }
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            kind: self.kind(),
            name: self.name(),
            namespace: self.namespace(),
        }
    }
}

macro_rules! impl_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Object {
                fn from(object: $variant) -> Self {
                    Object::$variant(object)
                }
            }
        )*
    };
}

impl_from!(
    Namespace,
    CustomResourceDefinition,
    Secret,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    Role,
    RoleBinding,
    Service,
    Deployment,
);

/// The complete set of objects needed to stand up one logical application.
///
/// Construction order is irrelevant: [`ObjectGraph::apply_order`] walks the graph by [`Rank`] and
/// [`ObjectGraph::delete_order`] walks it in reverse. Objects of equal rank keep the order in
/// which they were added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectGraph {
    objects: Vec<Object>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<O: Into<Object>>(&mut self, object: O) {
        self.objects.push(object.into());
    }

    pub fn with<O: Into<Object>>(mut self, object: O) -> Self {
        self.push(object);
        self
    }

    pub fn extend(&mut self, other: ObjectGraph) {
        self.objects.extend(other.objects);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in ascending rank order.
    pub fn apply_order(&self) -> Vec<&Object> {
        let mut ordered: Vec<&Object> = self.objects.iter().collect();
        // `sort_by_key` is stable, which preserves insertion order within a rank.
        ordered.sort_by_key(|object| object.rank());
        ordered
    }

    /// Objects in descending rank order.
    pub fn delete_order(&self) -> Vec<&Object> {
        let mut ordered = self.apply_order();
        ordered.reverse();
        ordered
    }

    pub fn refs(&self) -> Vec<ObjectRef> {
        self.apply_order()
            .into_iter()
            .map(Object::object_ref)
            .collect()
    }

    pub fn find(&self, kind: ObjectKind, name: &str) -> Option<&Object> {
        self.objects
            .iter()
            .find(|object| object.kind() == kind && object.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.objects.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            ..ObjectMeta::default()
        }
    }

    fn graph() -> ObjectGraph {
        ObjectGraph::new()
            .with(Deployment {
                metadata: meta("app", Some("ns")),
                ..Deployment::default()
            })
            .with(Service {
                metadata: meta("app", Some("ns")),
                ..Service::default()
            })
            .with(Secret {
                metadata: meta("first", Some("ns")),
                ..Secret::default()
            })
            .with(ClusterRole {
                metadata: meta("role", None),
                ..ClusterRole::default()
            })
            .with(ServiceAccount {
                metadata: meta("app", Some("ns")),
                ..ServiceAccount::default()
            })
            .with(Secret {
                metadata: meta("second", Some("ns")),
                ..Secret::default()
            })
    }

    #[test]
    fn apply_order_is_by_rank_and_stable() {
        let refs = graph().refs();
        let names: Vec<String> = refs.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec![
                "Secret 'ns/first'",
                "Secret 'ns/second'",
                "ServiceAccount 'ns/app'",
                "ClusterRole 'role'",
                "Service 'ns/app'",
                "Deployment 'ns/app'",
            ]
        );
    }

    #[test]
    fn delete_order_is_reversed() {
        let graph = graph();
        let kinds: Vec<ObjectKind> = graph
            .delete_order()
            .into_iter()
            .map(Object::kind)
            .collect();
        assert_eq!(kinds.first(), Some(&ObjectKind::Deployment));
        assert_eq!(kinds.last(), Some(&ObjectKind::Secret));
    }

    #[test]
    fn cluster_scoped_refs_drop_namespace() {
        let role = Object::from(ClusterRole {
            metadata: meta("role", Some("ignored")),
            ..ClusterRole::default()
        });
        assert_eq!(
            role.object_ref(),
            ObjectRef::cluster(ObjectKind::ClusterRole, "role")
        );
    }

    #[test]
    fn generated_names_fall_back_to_prefix() {
        let secret = Object::from(Secret {
            metadata: ObjectMeta {
                generate_name: Some("ca-".to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        });
        assert_eq!(secret.name(), "ca-");
    }

    #[test]
    fn find_by_kind_and_name() {
        let graph = graph();
        assert!(graph.find(ObjectKind::Service, "app").is_some());
        assert!(graph.find(ObjectKind::Service, "first").is_none());
        assert_eq!(graph.len(), 6);
    }
}
