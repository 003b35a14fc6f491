use super::error::{self, Result};
use super::{AllowNotFound, ObjectStore};
use crate::constants::NODE_INTERNAL_IP;
use crate::{Object, ObjectKind, ObjectRef};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use log::{trace, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::{OptionExt, ResultExt};
use std::fmt::Debug;
use std::net::IpAddr;

/// An [`ObjectStore`] backed by a Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Use the client configuration inferred from the environment.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context(error::InitializationSnafu)?;
        Ok(Self::new(client))
    }

    /// Use the current context of `kubeconfig`.
    pub async fn from_custom_kubeconfig(kubeconfig: Kubeconfig) -> Result<Self> {
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context(error::KubeconfigSnafu)?;
        let client = Client::try_from(config).context(error::InitializationSnafu)?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn all<K>(&self) -> Api<K>
    where
        K: kube::Resource<DynamicType = ()>,
    {
        Api::all(self.client.clone())
    }
}

fn namespace_of(kind: ObjectKind, name: &str, namespace: Option<&String>) -> Result<String> {
    Ok(namespace
        .cloned()
        .context(error::MissingNamespaceSnafu { kind, name })?)
}

async fn submit<K>(api: Api<K>, object: &K, what: &str) -> Result<K>
where
    K: Clone + DeserializeOwned + Serialize + Debug,
{
    Ok(api
        .create(&PostParams::default(), object)
        .await
        .context(error::KubeApiCallSnafu {
            method: "create",
            what,
        })?)
}

async fn remove<K>(api: Api<K>, name: &str, what: &str) -> Result<()>
where
    K: Clone + DeserializeOwned + Debug,
{
    api.delete(name, &DeleteParams::default())
        .await
        .context(error::KubeApiCallSnafu {
            method: "delete",
            what,
        })?;
    Ok(())
}

#[async_trait::async_trait]
impl ObjectStore for KubeStore {
    async fn create(&self, object: &Object) -> Result<Object> {
        let what = object.object_ref().to_string();
        trace!("creating {}", what);
        let namespace =
            || namespace_of(object.kind(), &object.name(), object.meta().namespace.as_ref());
        let client = self.client.clone();
        Ok(match object {
            Object::Namespace(inner) => submit(self.all(), inner, &what).await?.into(),
            Object::CustomResourceDefinition(inner) => {
                submit(self.all(), inner, &what).await?.into()
            }
            Object::ClusterRole(inner) => submit(self.all(), inner, &what).await?.into(),
            Object::ClusterRoleBinding(inner) => submit(self.all(), inner, &what).await?.into(),
            Object::Secret(inner) => {
                let api: Api<Secret> = Api::namespaced(client, &namespace()?);
                submit(api, inner, &what).await?.into()
            }
            Object::ServiceAccount(inner) => {
                let api: Api<ServiceAccount> = Api::namespaced(client, &namespace()?);
                submit(api, inner, &what).await?.into()
            }
            Object::Role(inner) => {
                let api: Api<Role> = Api::namespaced(client, &namespace()?);
                submit(api, inner, &what).await?.into()
            }
            Object::RoleBinding(inner) => {
                let api: Api<RoleBinding> = Api::namespaced(client, &namespace()?);
                submit(api, inner, &what).await?.into()
            }
            Object::Service(inner) => {
                let api: Api<Service> = Api::namespaced(client, &namespace()?);
                submit(api, inner, &what).await?.into()
            }
            Object::Deployment(inner) => {
                let api: Api<Deployment> = Api::namespaced(client, &namespace()?);
                submit(api, inner, &what).await?.into()
            }
        })
    }

    async fn delete(&self, object: &ObjectRef) -> Result<()> {
        let what = object.to_string();
        trace!("deleting {}", what);
        let name = object.name.as_str();
        let namespace = || namespace_of(object.kind, name, object.namespace.as_ref());
        let client = self.client.clone();
        match object.kind {
            ObjectKind::Namespace => remove::<Namespace>(self.all(), name, &what).await,
            ObjectKind::CustomResourceDefinition => {
                remove::<CustomResourceDefinition>(self.all(), name, &what).await
            }
            ObjectKind::ClusterRole => remove::<ClusterRole>(self.all(), name, &what).await,
            ObjectKind::ClusterRoleBinding => {
                remove::<ClusterRoleBinding>(self.all(), name, &what).await
            }
            ObjectKind::Secret => {
                let api: Api<Secret> = Api::namespaced(client, &namespace()?);
                remove(api, name, &what).await
            }
            ObjectKind::ServiceAccount => {
                let api: Api<ServiceAccount> = Api::namespaced(client, &namespace()?);
                remove(api, name, &what).await
            }
            ObjectKind::Role => {
                let api: Api<Role> = Api::namespaced(client, &namespace()?);
                remove(api, name, &what).await
            }
            ObjectKind::RoleBinding => {
                let api: Api<RoleBinding> = Api::namespaced(client, &namespace()?);
                remove(api, name, &what).await
            }
            ObjectKind::Service => {
                let api: Api<Service> = Api::namespaced(client, &namespace()?);
                remove(api, name, &what).await
            }
            ObjectKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(client, &namespace()?);
                remove(api, name, &what).await
            }
        }
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        Ok(self
            .all::<Namespace>()
            .get(name)
            .await
            .allow_not_found(|_| ())
            .context(error::KubeApiCallSnafu {
                method: "get",
                what: format!("namespace '{}'", name),
            })?)
    }

    async fn get_crd(&self, name: &str) -> Result<Option<CustomResourceDefinition>> {
        Ok(self
            .all::<CustomResourceDefinition>()
            .get(name)
            .await
            .allow_not_found(|_| ())
            .context(error::KubeApiCallSnafu {
                method: "get",
                what: format!("custom resource definition '{}'", name),
            })?)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .get(name)
            .await
            .allow_not_found(|_| ())
            .context(error::KubeApiCallSnafu {
                method: "get",
                what: format!("deployment '{}/{}'", namespace, name),
            })?)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .list(&ListParams::default().labels(label_selector))
            .await
            .context(error::KubeApiCallSnafu {
                method: "list",
                what: format!("pods '{}' in '{}'", label_selector, namespace),
            })?
            .items)
    }

    async fn node_internal_ips(&self) -> Result<Vec<IpAddr>> {
        let nodes = self
            .all::<Node>()
            .list(&ListParams::default())
            .await
            .context(error::KubeApiCallSnafu {
                method: "list",
                what: "nodes",
            })?
            .items;
        Ok(nodes
            .iter()
            .filter_map(|node| node.status.as_ref()?.addresses.as_ref())
            .flatten()
            .filter(|address| address.type_ == NODE_INTERNAL_IP)
            .filter_map(|address| match address.address.parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    warn!("ignoring unparsable node address '{}'", address.address);
                    None
                }
            })
            .collect())
    }
}
