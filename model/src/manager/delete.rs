use super::error::{self, Result};
use super::DeployManager;
use crate::clients::{AllowNotFound, ObjectStore};
use crate::schema::{crd_name, read_crd};
use crate::{ObjectGraph, ObjectKind, ObjectRef};
use log::{debug, warn};
use snafu::ResultExt;
use std::path::Path;

impl<S: ObjectStore> DeployManager<S> {
    /// Delete every object of `graph`, highest rank first. Objects that are already gone count as
    /// deleted. Every object is attempted; the first failure is returned afterwards.
    pub async fn delete(&self, graph: &ObjectGraph) -> Result<()> {
        let mut first_error = None;
        for object in graph.delete_order() {
            if let Err(e) = self.delete_object(&object.object_ref()).await {
                warn!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Delete a single object. Returns `false` if it did not exist.
    pub async fn delete_object(&self, object: &ObjectRef) -> Result<bool> {
        debug!("deleting {}", object);
        Ok(self
            .store
            .delete(object)
            .await
            .allow_not_found(|_| warn!("{} was already deleted", object))
            .context(error::DeleteSnafu {
                object: object.clone(),
            })?
            .is_some())
    }

    /// Decode the custom resource definition in `path` and delete it by name. Decoding failures
    /// are reported before anything is deleted.
    pub async fn delete_crd_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let crd = read_crd(path).await.context(error::ModelSnafu)?;
        self.delete_object(&ObjectRef::cluster(
            ObjectKind::CustomResourceDefinition,
            crd_name(&crd),
        ))
        .await?;
        Ok(())
    }

    /// Delete a namespace, and with it everything it contains or owns.
    pub async fn delete_namespace(&self, name: &str) -> Result<bool> {
        self.delete_object(&ObjectRef::cluster(ObjectKind::Namespace, name))
            .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clients::{FakeStore, StoreEvent};
    use crate::manager::Error;
    use crate::schema::test::CRD_YAML;
    use crate::system::{build_app, SessionScope};
    use crate::{AccessGrant, AppDescriptor, ConfigSecret, GrantSubject, ObjectKind};
    use std::io::Write;

    fn app() -> AppDescriptor {
        AppDescriptor::new("probe", "probe:e2e")
            .with_config_secret(
                ConfigSecret::new("probe-config", "/etc/probe").with_file("config.yaml", "{}"),
            )
            .with_access(AccessGrant::new("reader").bound_to(GrantSubject::AppServiceAccount))
    }

    async fn setup(store: FakeStore) -> (DeployManager<FakeStore>, SessionScope) {
        let manager = DeployManager::new(store);
        let scope = manager.create_namespace("e2e").await.unwrap();
        (manager, scope)
    }

    fn position(created: &[ObjectRef], kind: ObjectKind) -> Vec<usize> {
        created
            .iter()
            .enumerate()
            .filter(|(_, object)| object.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    #[tokio::test]
    async fn deployment_is_submitted_last() {
        let store = FakeStore::new();
        let (manager, scope) = setup(store.clone()).await;
        let built = build_app(&app(), &scope, &[]).unwrap();
        manager.apply(&built.graph).await.unwrap();

        let created = store.created();
        let deployment = position(&created, ObjectKind::Deployment)[0];
        for kind in [
            ObjectKind::Secret,
            ObjectKind::ServiceAccount,
            ObjectKind::ClusterRole,
            ObjectKind::ClusterRoleBinding,
            ObjectKind::Service,
        ] {
            for i in position(&created, kind) {
                assert!(i < deployment, "{} submitted after the deployment", kind);
            }
        }
        assert_eq!(position(&created, ObjectKind::Secret).len(), 2);
        assert_eq!(position(&created, ObjectKind::Namespace), vec![0]);
    }

    #[tokio::test]
    async fn rejection_stops_submission() {
        let store = FakeStore::new().rejecting(ObjectKind::Service, "probe");
        let (manager, scope) = setup(store.clone()).await;
        let built = build_app(&app(), &scope, &[]).unwrap();
        let err = manager.apply(&built.graph).await.unwrap_err();
        match &err {
            Error::Create { object, .. } => {
                assert_eq!(object.kind, ObjectKind::Service);
                assert_eq!(object.name, "probe");
                let message = err.to_string();
                assert!(message.starts_with("Unable to create"), "{}", message);
                assert_eq!(message.matches(&object.to_string()).count(), 1, "{}", message);
            }
            other => panic!("expected a create error, got {}", other),
        }
        assert_eq!(store.count(ObjectKind::Deployment), 0);
        assert_eq!(store.count(ObjectKind::ServiceAccount), 1);
    }

    #[tokio::test]
    async fn deleting_twice_succeeds() {
        let store = FakeStore::new();
        let (manager, scope) = setup(store.clone()).await;
        let built = build_app(&app(), &scope, &[]).unwrap();
        let applied = manager.apply(&built.graph).await.unwrap();

        manager.delete(&applied.to_graph()).await.unwrap();
        assert_eq!(store.len(), 1);
        manager.delete(&applied.to_graph()).await.unwrap();
        assert!(store
            .events()
            .iter()
            .any(|event| matches!(event, StoreEvent::Missing(_))));

        assert!(manager.delete_namespace(scope.namespace()).await.unwrap());
        assert!(!manager.delete_namespace(scope.namespace()).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn partial_deletion_is_tolerated() {
        let store = FakeStore::new();
        let (manager, scope) = setup(store.clone()).await;
        let built = build_app(&app(), &scope, &[]).unwrap();
        manager.apply(&built.graph).await.unwrap();
        manager
            .delete_object(&ObjectRef::namespaced(
                ObjectKind::Service,
                scope.namespace(),
                "probe",
            ))
            .await
            .unwrap();
        manager.delete(&built.graph).await.unwrap();
        assert_eq!(store.count(ObjectKind::Secret), 0);
        assert_eq!(store.count(ObjectKind::ClusterRole), 0);
    }

    #[tokio::test]
    async fn crd_file_lifecycle() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CRD_YAML.as_bytes()).unwrap();
        let store = FakeStore::new();
        let (manager, scope) = setup(store.clone()).await;

        let registration = manager.create_crd_file(&scope, file.path()).await.unwrap();
        assert!(registration.created);
        let name = registration.name;
        assert_eq!(name, "capiroles.rbac.platformengineers.io");
        manager
            .wait_established(&name, std::time::Duration::from_secs(1))
            .await
            .unwrap();
        manager.delete_crd_file(file.path()).await.unwrap();
        manager.delete_crd_file(file.path()).await.unwrap();
        assert_eq!(store.count(ObjectKind::CustomResourceDefinition), 0);
    }

    #[tokio::test]
    async fn malformed_crd_file_fails_before_any_call() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"kind: [unterminated").unwrap();
        let store = FakeStore::new();
        let (manager, scope) = setup(store.clone()).await;
        let before = store.events().len();
        assert!(manager.delete_crd_file(file.path()).await.is_err());
        assert!(manager.create_crd_file(&scope, file.path()).await.is_err());
        assert_eq!(store.events().len(), before);
    }

    #[tokio::test]
    async fn crd_is_collected_with_the_namespace() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CRD_YAML.as_bytes()).unwrap();
        let store = FakeStore::new();
        let (manager, scope) = setup(store.clone()).await;

        let name = manager
            .create_crd_file(&scope, file.path())
            .await
            .unwrap()
            .name;
        let crd_ref = ObjectRef::cluster(ObjectKind::CustomResourceDefinition, &name);
        let stored = store.get(&crd_ref).unwrap();
        assert_eq!(
            stored.meta().owner_references,
            Some(vec![scope.owner_reference()])
        );

        assert!(manager.delete_namespace(scope.namespace()).await.unwrap());
        assert!(!store.contains(&crd_ref));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn existing_crd_is_left_to_its_creator() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CRD_YAML.as_bytes()).unwrap();
        let store = FakeStore::new();
        let (manager, first) = setup(store.clone()).await;
        let second = manager.create_namespace("e2e").await.unwrap();

        assert!(manager.create_crd_file(&first, file.path()).await.unwrap().created);
        let registration = manager.create_crd_file(&second, file.path()).await.unwrap();
        assert!(!registration.created);
        let stored = store
            .get(&ObjectRef::cluster(
                ObjectKind::CustomResourceDefinition,
                registration.name,
            ))
            .unwrap();
        assert_eq!(
            stored.meta().owner_references,
            Some(vec![first.owner_reference()])
        );
    }
}
