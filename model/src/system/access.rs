use super::SessionScope;
use crate::constants::RBAC_API_GROUP;
use crate::{AccessGrant, GrantSubject, Object};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, RoleRef, Subject};

/// The name shared by the cluster role and cluster role binding of `grant`. Cluster-scoped names
/// must be unique across sessions, so the session namespace is part of it.
pub fn cluster_role_name(app: &str, grant: &str, scope: &SessionScope) -> String {
    format!("{}-{}-{}", app, grant, scope.namespace())
}

/// Defines a cluster role and its binding for each of `grants`. Both are owned by the session
/// namespace.
pub fn access_objects(app: &str, scope: &SessionScope, grants: &[AccessGrant]) -> Vec<Object> {
    grants
        .iter()
        .flat_map(|grant| {
            let name = cluster_role_name(app, &grant.name, scope);
            let role = ClusterRole {
                metadata: scope.owned_meta(&name),
                rules: Some(grant.rules.clone()),
                ..Default::default()
            };
            let binding = ClusterRoleBinding {
                metadata: scope.owned_meta(&name),
                role_ref: RoleRef {
                    api_group: RBAC_API_GROUP.to_string(),
                    kind: "ClusterRole".to_string(),
                    name,
                },
                subjects: Some(
                    grant
                        .subjects
                        .iter()
                        .map(|subject| subject_for(app, scope, subject))
                        .collect(),
                ),
            };
            [Object::from(role), Object::from(binding)]
        })
        .collect()
}

fn subject_for(app: &str, scope: &SessionScope, subject: &GrantSubject) -> Subject {
    match subject {
        GrantSubject::AppServiceAccount => Subject {
            kind: "ServiceAccount".to_string(),
            name: app.to_string(),
            namespace: Some(scope.namespace().to_string()),
            ..Default::default()
        },
        GrantSubject::User(user) => Subject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: "User".to_string(),
            name: user.clone(),
            ..Default::default()
        },
        GrantSubject::Group(group) => Subject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: "Group".to_string(),
            name: group.clone(),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::api::rbac::v1::PolicyRule;

    #[test]
    fn grant_becomes_owned_role_and_binding() {
        let scope = SessionScope::new("e2e-x", "uid-9");
        let grant = AccessGrant::new("impersonate")
            .with_rule(PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["users".to_string()]),
                verbs: vec!["impersonate".to_string()],
                ..Default::default()
            })
            .bound_to(GrantSubject::AppServiceAccount)
            .bound_to(GrantSubject::User("user@example.com".to_string()));
        let objects = access_objects("proxy", &scope, &[grant]);
        assert_eq!(objects.len(), 2);

        for object in &objects {
            assert_eq!(object.name(), "proxy-impersonate-e2e-x");
            let owners = object.meta().owner_references.clone().unwrap();
            assert_eq!(owners, vec![scope.owner_reference()]);
        }

        match &objects[1] {
            Object::ClusterRoleBinding(binding) => {
                assert_eq!(binding.role_ref.name, "proxy-impersonate-e2e-x");
                let subjects = binding.subjects.clone().unwrap();
                assert_eq!(subjects[0].kind, "ServiceAccount");
                assert_eq!(subjects[0].namespace.as_deref(), Some("e2e-x"));
                assert_eq!(subjects[1].kind, "User");
                assert_eq!(subjects[1].name, "user@example.com");
            }
            other => panic!("expected a cluster role binding, got {:?}", other.kind()),
        }
    }
}
