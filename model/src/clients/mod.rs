/*!

The seam between the harness and the remote object store. [`KubeStore`] talks to a Kubernetes API
server; [`FakeStore`] keeps everything in memory and is available to tests through the `fake`
feature.

!*/

mod error;
#[cfg(any(test, feature = "fake"))]
mod fake;
mod kube_store;
mod status;

pub use error::{Error, Result};
#[cfg(any(test, feature = "fake"))]
pub use fake::{FakeStore, StoreEvent};
pub use kube_store::KubeStore;
pub use status::{AllowNotFound, HttpStatusCode, StatusCode};

use crate::{Object, ObjectRef};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use std::net::IpAddr;

/// The operations the harness needs from the remote store. Reads of a single object return
/// `Ok(None)` when the object does not exist; every other failure, including a `404` on delete,
/// is an `Err` so that callers decide which statuses to tolerate.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Submit `object` and return it as stored, with server-assigned fields filled in.
    async fn create(&self, object: &Object) -> Result<Object>;

    async fn delete(&self, object: &ObjectRef) -> Result<()>;

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>>;

    async fn get_crd(&self, name: &str) -> Result<Option<CustomResourceDefinition>>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    /// The `InternalIP` address of every node.
    async fn node_internal_ips(&self) -> Result<Vec<IpAddr>>;
}
