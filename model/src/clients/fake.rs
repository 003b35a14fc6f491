use super::error::{InnerError, Result};
use super::ObjectStore;
use crate::constants::{CONDITION_ESTABLISHED, CONDITION_TRUE, SERVICE_TYPE_NODE_PORT};
use crate::{Object, ObjectKind, ObjectRef};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionCondition, CustomResourceDefinitionStatus,
};
use kube::api::ObjectMeta;
use kube::error::ErrorResponse;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Something that happened to the contents of a [`FakeStore`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StoreEvent {
    Created(ObjectRef),
    Deleted(ObjectRef),
    /// A delete was issued for an object that did not exist.
    Missing(ObjectRef),
}

#[derive(Debug, Clone)]
struct Behavior {
    node_ips: Vec<IpAddr>,
    ready_after_polls: Option<u32>,
    establish_crds: bool,
    terminating_polls: u32,
    rejected: Vec<(ObjectKind, String)>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            node_ips: Vec::new(),
            ready_after_polls: Some(1),
            establish_crds: true,
            terminating_polls: 0,
            rejected: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    behavior: Behavior,
    objects: BTreeMap<ObjectRef, Object>,
    /// Deleted deployments that stay visible for the given number of further reads.
    terminating: BTreeMap<ObjectRef, (Object, u32)>,
    polls: BTreeMap<ObjectRef, u32>,
    events: Vec<StoreEvent>,
    next_id: u32,
}

/// An in-memory [`ObjectStore`] that mimics the parts of the API server the harness relies on:
/// generated names, namespace UIDs, node port allocation, conflicts, not-found errors, garbage
/// collection of namespace-owned objects, deployments that become ready after some reads, and
/// deployments that linger after deletion.
///
/// Clones share state, so a test can keep a handle while a session owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<State>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_ips<I: IntoIterator<Item = IpAddr>>(self, node_ips: I) -> Self {
        self.lock().behavior.node_ips = node_ips.into_iter().collect();
        self
    }

    /// Deployments report ready on the `polls`-th read. The default is the first read.
    pub fn with_ready_after(self, polls: u32) -> Self {
        self.lock().behavior.ready_after_polls = Some(polls);
        self
    }

    pub fn never_ready(self) -> Self {
        self.lock().behavior.ready_after_polls = None;
        self
    }

    pub fn never_establish(self) -> Self {
        self.lock().behavior.establish_crds = false;
        self
    }

    /// Deleted deployments, and their pods, remain readable for `polls` further reads.
    pub fn with_terminating_polls(self, polls: u32) -> Self {
        self.lock().behavior.terminating_polls = polls;
        self
    }

    /// Creating the object `kind`/`name` fails as invalid.
    pub fn rejecting<S: Into<String>>(self, kind: ObjectKind, name: S) -> Self {
        self.lock().behavior.rejected.push((kind, name.into()));
        self
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.lock().events.clone()
    }

    /// Every successfully created object in submission order.
    pub fn created(&self) -> Vec<ObjectRef> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                StoreEvent::Created(object) => Some(object.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn get(&self, object: &ObjectRef) -> Option<Object> {
        self.lock().objects.get(object).cloned()
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.lock().objects.contains_key(object)
    }

    /// Objects currently stored, excluding lingering deployments.
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    pub fn count(&self, kind: ObjectKind) -> usize {
        self.lock()
            .objects
            .keys()
            .filter(|object| object.kind == kind)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn api_failure<T>(code: u16, reason: &str, method: &str, what: String) -> Result<T> {
    let source = kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: reason.to_string(),
        reason: reason.to_string(),
        code,
    });
    Err(InnerError::KubeApiCall {
        method: method.to_string(),
        what,
        source,
    }
    .into())
}

fn crd_status(established: bool) -> CustomResourceDefinitionStatus {
    let condition = |type_: &str, status: &str| CustomResourceDefinitionCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        ..CustomResourceDefinitionCondition::default()
    };
    CustomResourceDefinitionStatus {
        conditions: Some(vec![
            condition("NamesAccepted", CONDITION_TRUE),
            condition(
                CONDITION_ESTABLISHED,
                if established { CONDITION_TRUE } else { "False" },
            ),
        ]),
        ..CustomResourceDefinitionStatus::default()
    }
}

fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term.trim()),
        })
}

impl State {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Fill in the fields the API server assigns on creation.
    fn admit(&mut self, object: &mut Object) {
        let id = self.next_id();
        let established = self.behavior.establish_crds;
        let meta = object.meta_mut();
        if meta.name.is_none() {
            meta.name = Some(format!(
                "{}{:05}",
                meta.generate_name.clone().unwrap_or_default(),
                id
            ));
        }
        meta.uid = Some(format!("uid-{:05}", id));
        meta.resource_version = Some("1".to_string());

        match object {
            Object::Deployment(deployment) => {
                deployment.metadata.generation = Some(1);
                deployment.status = Some(DeploymentStatus {
                    observed_generation: Some(1),
                    replicas: deployment.spec.as_ref().and_then(|spec| spec.replicas),
                    ..DeploymentStatus::default()
                });
            }
            Object::Service(service) => {
                if let Some(spec) = service.spec.as_mut() {
                    if spec.type_.as_deref() == Some(SERVICE_TYPE_NODE_PORT) {
                        for (i, port) in spec.ports.iter_mut().flatten().enumerate() {
                            port.node_port.get_or_insert(30000 + (id as i32 * 10) + i as i32);
                        }
                    }
                }
            }
            Object::CustomResourceDefinition(crd) => crd.status = Some(crd_status(established)),
            _ => {}
        }
    }

    /// Removes everything living in, or owned by, the namespace `name` with `uid`.
    fn collect_garbage(&mut self, name: &str, uid: Option<&str>) {
        let owned_by = |meta: &ObjectMeta| {
            meta.owner_references
                .iter()
                .flatten()
                .any(|owner| Some(owner.uid.as_str()) == uid)
        };
        self.objects.retain(|object_ref, object| {
            object_ref.namespace.as_deref() != Some(name) && !owned_by(object.meta())
        });
        self.terminating
            .retain(|object_ref, _| object_ref.namespace.as_deref() != Some(name));
    }

    fn deployment_read(&mut self, object_ref: &ObjectRef) -> Option<Deployment> {
        if let Some((object, remaining)) = self.terminating.get_mut(object_ref) {
            if *remaining > 0 {
                *remaining -= 1;
                if let Object::Deployment(deployment) = object {
                    return Some(deployment.clone());
                }
            }
            self.terminating.remove(object_ref);
            return None;
        }

        let polls = self.polls.entry(object_ref.clone()).or_default();
        *polls += 1;
        let ready = self
            .behavior
            .ready_after_polls
            .map(|after| *polls >= after)
            .unwrap_or_default();

        match self.objects.get_mut(object_ref) {
            Some(Object::Deployment(deployment)) => {
                if ready {
                    let replicas = deployment
                        .spec
                        .as_ref()
                        .and_then(|spec| spec.replicas)
                        .unwrap_or(1);
                    let status = deployment.status.get_or_insert_with(Default::default);
                    status.observed_generation = deployment.metadata.generation;
                    status.ready_replicas = Some(replicas);
                    status.available_replicas = Some(replicas);
                }
                Some(deployment.clone())
            }
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for FakeStore {
    async fn create(&self, object: &Object) -> Result<Object> {
        let mut state = self.lock();
        let what = object.object_ref().to_string();

        if state
            .behavior
            .rejected
            .iter()
            .any(|(kind, name)| *kind == object.kind() && *name == object.name())
        {
            return api_failure(422, "Invalid", "create", what);
        }
        if let Some(namespace) = object.namespace() {
            if !state
                .objects
                .contains_key(&ObjectRef::cluster(ObjectKind::Namespace, namespace.as_str()))
            {
                return api_failure(404, "NotFound", "create", what);
            }
        }

        let mut stored = object.clone();
        state.admit(&mut stored);
        let object_ref = stored.object_ref();
        if state.objects.contains_key(&object_ref) || state.terminating.contains_key(&object_ref)
        {
            return api_failure(409, "AlreadyExists", "create", what);
        }

        state.polls.remove(&object_ref);
        state.events.push(StoreEvent::Created(object_ref.clone()));
        state.objects.insert(object_ref, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, object: &ObjectRef) -> Result<()> {
        let mut state = self.lock();
        let removed = match state.objects.remove(object) {
            Some(removed) => removed,
            None => {
                state.events.push(StoreEvent::Missing(object.clone()));
                return api_failure(404, "NotFound", "delete", object.to_string());
            }
        };
        state.events.push(StoreEvent::Deleted(object.clone()));

        match object.kind {
            ObjectKind::Namespace => {
                let uid = removed.meta().uid.clone();
                state.collect_garbage(&object.name, uid.as_deref());
            }
            ObjectKind::Deployment if state.behavior.terminating_polls > 0 => {
                let polls = state.behavior.terminating_polls;
                state.terminating.insert(object.clone(), (removed, polls));
            }
            _ => {}
        }
        Ok(())
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let state = self.lock();
        Ok(
            match state
                .objects
                .get(&ObjectRef::cluster(ObjectKind::Namespace, name))
            {
                Some(Object::Namespace(namespace)) => Some(namespace.clone()),
                _ => None,
            },
        )
    }

    async fn get_crd(&self, name: &str) -> Result<Option<CustomResourceDefinition>> {
        let state = self.lock();
        Ok(
            match state
                .objects
                .get(&ObjectRef::cluster(ObjectKind::CustomResourceDefinition, name))
            {
                Some(Object::CustomResourceDefinition(crd)) => Some(crd.clone()),
                _ => None,
            },
        )
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let object_ref = ObjectRef::namespaced(ObjectKind::Deployment, namespace, name);
        Ok(self.lock().deployment_read(&object_ref))
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let state = self.lock();
        let live = state.objects.values();
        let lingering = state.terminating.values().map(|(object, _)| object);
        Ok(live
            .chain(lingering)
            .filter_map(|object| match object {
                Object::Deployment(deployment) => Some(deployment),
                _ => None,
            })
            .filter(|deployment| deployment.metadata.namespace.as_deref() == Some(namespace))
            .filter_map(|deployment| {
                let labels = deployment
                    .spec
                    .as_ref()?
                    .template
                    .metadata
                    .as_ref()?
                    .labels
                    .clone()?;
                if !selector_matches(label_selector, &labels) {
                    return None;
                }
                Some(Pod {
                    metadata: ObjectMeta {
                        name: Some(format!(
                            "{}-0",
                            deployment.metadata.name.clone().unwrap_or_default()
                        )),
                        namespace: Some(namespace.to_string()),
                        labels: Some(labels),
                        ..ObjectMeta::default()
                    },
                    ..Pod::default()
                })
            })
            .collect())
    }

    async fn node_internal_ips(&self) -> Result<Vec<IpAddr>> {
        Ok(self.lock().behavior.node_ips.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clients::{HttpStatusCode, StatusCode};
    use k8s_openapi::api::core::v1::{Secret, Service, ServicePort, ServiceSpec};

    fn namespace(generate_name: &str) -> Object {
        Namespace {
            metadata: ObjectMeta {
                generate_name: Some(generate_name.to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        }
        .into()
    }

    fn secret(namespace: &str, name: &str) -> Object {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        }
        .into()
    }

    #[tokio::test]
    async fn generated_names_and_uids() {
        let store = FakeStore::new();
        let created = store.create(&namespace("e2e-")).await.unwrap();
        assert!(created.name().starts_with("e2e-"));
        assert_ne!(created.name(), "e2e-");
        assert!(created.meta().uid.is_some());
        assert!(store.get_namespace(&created.name()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn namespaced_objects_need_their_namespace() {
        let store = FakeStore::new();
        let err = store.create(&secret("absent", "s")).await.unwrap_err();
        assert!(err.is_status_code(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn duplicates_conflict_and_missing_deletes_are_not_found() {
        let store = FakeStore::new();
        let ns = store.create(&namespace("e2e-")).await.unwrap().name();
        store.create(&secret(&ns, "s")).await.unwrap();
        let err = store.create(&secret(&ns, "s")).await.unwrap_err();
        assert!(err.is_status_code(StatusCode::CONFLICT));

        let object = ObjectRef::namespaced(ObjectKind::Secret, &ns, "s");
        store.delete(&object).await.unwrap();
        let err = store.delete(&object).await.unwrap_err();
        assert!(err.is_status_code(StatusCode::NOT_FOUND));
        assert_eq!(
            store.events().last(),
            Some(&StoreEvent::Missing(object.clone()))
        );
    }

    #[tokio::test]
    async fn node_ports_are_allocated() {
        let store = FakeStore::new();
        let ns = store.create(&namespace("e2e-")).await.unwrap().name();
        let service = Service {
            metadata: ObjectMeta {
                name: Some("proxy".to_string()),
                namespace: Some(ns),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(SERVICE_TYPE_NODE_PORT.to_string()),
                ports: Some(vec![ServicePort {
                    port: 6443,
                    ..ServicePort::default()
                }]),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        };
        match store.create(&service.into()).await.unwrap() {
            Object::Service(service) => {
                let port = &service.spec.unwrap().ports.unwrap()[0];
                assert!(port.node_port.unwrap() >= 30000);
            }
            other => panic!("unexpected {:?}", other.kind()),
        }
    }

    #[tokio::test]
    async fn namespace_deletion_collects_owned_objects() {
        let store = FakeStore::new();
        let ns = store.create(&namespace("e2e-")).await.unwrap();
        let scope = crate::system::SessionScope::from_namespace(match &ns {
            Object::Namespace(ns) => ns,
            _ => unreachable!(),
        })
        .unwrap();
        store.create(&secret(scope.namespace(), "s")).await.unwrap();
        let role = k8s_openapi::api::rbac::v1::ClusterRole {
            metadata: ObjectMeta {
                name: Some("owned".to_string()),
                owner_references: Some(vec![scope.owner_reference()]),
                ..ObjectMeta::default()
            },
            ..Default::default()
        };
        store.create(&role.into()).await.unwrap();
        assert_eq!(store.len(), 3);

        store.delete(&ns.object_ref()).await.unwrap();
        assert!(store.is_empty());
    }
}
