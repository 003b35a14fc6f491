use super::error::{self, Result};
use super::DeployManager;
use crate::clients::ObjectStore;
use crate::constants::{CONDITION_ESTABLISHED, CONDITION_TRUE, LABEL_APP};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use log::{debug, trace};
use snafu::ResultExt;
use std::time::Duration;
use tokio::time::Instant;

/// A deployment is ready once at least one replica is ready and the controller has observed the
/// latest generation of its spec.
pub fn is_deployment_ready(deployment: &Deployment) -> bool {
    let status = match &deployment.status {
        Some(status) => status,
        None => return false,
    };
    status.ready_replicas.unwrap_or_default() >= 1
        && status.observed_generation.is_some()
        && status.observed_generation == deployment.metadata.generation
}

/// Only an `Established` condition with status `True` counts.
pub fn is_crd_established(crd: &CustomResourceDefinition) -> bool {
    crd.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions.iter().any(|condition| {
                condition.type_ == CONDITION_ESTABLISHED && condition.status == CONDITION_TRUE
            })
        })
        .unwrap_or_default()
}

/// A one-line rendering of what was last seen of a deployment, for error messages.
pub fn describe_deployment(deployment: Option<&Deployment>) -> String {
    let deployment = match deployment {
        Some(deployment) => deployment,
        None => return "not found".to_string(),
    };
    match &deployment.status {
        None => "no status".to_string(),
        Some(status) => format!(
            "{}/{} replicas ready, generation {}, observed generation {}",
            status.ready_replicas.unwrap_or_default(),
            status.replicas.unwrap_or_default(),
            deployment
                .metadata
                .generation
                .map(|g| g.to_string())
                .unwrap_or_else(|| "unset".to_string()),
            status
                .observed_generation
                .map(|g| g.to_string())
                .unwrap_or_else(|| "unset".to_string()),
        ),
    }
}

/// A one-line rendering of the conditions of a custom resource definition.
pub fn describe_crd(crd: Option<&CustomResourceDefinition>) -> String {
    let conditions = match crd {
        None => return "not found".to_string(),
        Some(crd) => crd
            .status
            .as_ref()
            .and_then(|status| status.conditions.clone())
            .unwrap_or_default(),
    };
    if conditions.is_empty() {
        return "no conditions".to_string();
    }
    conditions
        .iter()
        .map(|condition| format!("{}={}", condition.type_, condition.status))
        .collect::<Vec<_>>()
        .join(", ")
}

struct Deadline {
    until: Instant,
    timeout: Duration,
}

impl Deadline {
    fn new(timeout: Duration) -> Self {
        Self {
            until: Instant::now() + timeout,
            timeout,
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.until
    }

    /// Sleep for `interval`, but never past the deadline.
    async fn nap(&self, interval: Duration) {
        let remaining = self.until.saturating_duration_since(Instant::now());
        tokio::time::sleep(interval.min(remaining)).await;
    }
}

impl<S: ObjectStore> DeployManager<S> {
    /// Wait until the namespace `name` can be read back.
    pub async fn wait_namespace(&self, name: &str, timeout: Duration) -> Result<Namespace> {
        let deadline = Deadline::new(timeout);
        loop {
            let namespace = self
                .store
                .get_namespace(name)
                .await
                .context(error::StoreSnafu {
                    action: format!("get namespace '{}'", name),
                })?;
            if let Some(namespace) = namespace {
                return Ok(namespace);
            }
            if deadline.expired() {
                return error::TimeoutSnafu {
                    what: format!("namespace '{}'", name),
                    timeout: deadline.timeout,
                    last_observed: "not found",
                }
                .fail();
            }
            deadline.nap(self.poll_interval).await;
        }
    }

    /// Wait until the deployment `namespace/name` is ready. A deployment that does not exist yet
    /// is polled again.
    pub async fn wait_ready(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<Deployment> {
        debug!(
            "waiting up to {:?} for deployment '{}/{}'",
            timeout, namespace, name
        );
        let deadline = Deadline::new(timeout);
        loop {
            let deployment = self
                .store
                .get_deployment(namespace, name)
                .await
                .context(error::StoreSnafu {
                    action: format!("get deployment '{}/{}'", namespace, name),
                })?;
            match deployment {
                Some(deployment) if is_deployment_ready(&deployment) => return Ok(deployment),
                other => {
                    let last_observed = describe_deployment(other.as_ref());
                    trace!("deployment '{}/{}': {}", namespace, name, last_observed);
                    if deadline.expired() {
                        return error::TimeoutSnafu {
                            what: format!("deployment '{}/{}' to be ready", namespace, name),
                            timeout: deadline.timeout,
                            last_observed,
                        }
                        .fail();
                    }
                }
            }
            deadline.nap(self.poll_interval).await;
        }
    }

    /// Wait until the custom resource definition `name` is established.
    pub async fn wait_established(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<CustomResourceDefinition> {
        debug!("waiting up to {:?} for '{}' to be established", timeout, name);
        let deadline = Deadline::new(timeout);
        loop {
            let crd = self
                .store
                .get_crd(name)
                .await
                .context(error::StoreSnafu {
                    action: format!("get custom resource definition '{}'", name),
                })?;
            match crd {
                Some(crd) if is_crd_established(&crd) => return Ok(crd),
                other => {
                    let last_observed = describe_crd(other.as_ref());
                    trace!("custom resource definition '{}': {}", name, last_observed);
                    if deadline.expired() {
                        return error::TimeoutSnafu {
                            what: format!(
                                "custom resource definition '{}' to be established",
                                name
                            ),
                            timeout: deadline.timeout,
                            last_observed,
                        }
                        .fail();
                    }
                }
            }
            deadline.nap(self.poll_interval).await;
        }
    }

    /// Wait until the deployment `namespace/name` is gone and no pod labelled `app=<name>` is
    /// left.
    pub async fn wait_deleted(&self, namespace: &str, name: &str, timeout: Duration) -> Result<()> {
        debug!(
            "waiting up to {:?} for deployment '{}/{}' to be deleted",
            timeout, namespace, name
        );
        let selector = format!("{}={}", LABEL_APP, name);
        let deadline = Deadline::new(timeout);
        loop {
            let deployment = self
                .store
                .get_deployment(namespace, name)
                .await
                .context(error::StoreSnafu {
                    action: format!("get deployment '{}/{}'", namespace, name),
                })?;
            let last_observed = match deployment {
                Some(deployment) => format!(
                    "deployment present, {}",
                    describe_deployment(Some(&deployment))
                ),
                None => {
                    let pods = self
                        .store
                        .list_pods(namespace, &selector)
                        .await
                        .context(error::StoreSnafu {
                            action: format!("list pods '{}' in '{}'", selector, namespace),
                        })?;
                    if pods.is_empty() {
                        return Ok(());
                    }
                    format!("{} pods remaining", pods.len())
                }
            };
            trace!("deployment '{}/{}': {}", namespace, name, last_observed);
            if deadline.expired() {
                return error::TimeoutSnafu {
                    what: format!("deployment '{}/{}' to be deleted", namespace, name),
                    timeout: deadline.timeout,
                    last_observed,
                }
                .fail();
            }
            deadline.nap(self.poll_interval).await;
        }
    }
}
