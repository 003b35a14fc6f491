use crate::apps::{self, AppRole, ProxyInputs, PROXY_NAME};
use crate::cluster::read_in_cluster_kubeconfig;
use crate::error::{self, Error, Result};
use crate::Config;
use e2e_model::clients::ObjectStore;
use e2e_model::manager::DeployManager;
use e2e_model::system::{build_app, ca_secret, secret_volume, BuiltApp, SessionScope};
use e2e_model::{AppDescriptor, DeployedEndpoint, Exposure, KeyBundle, ObjectGraph, ObjectRef};
use k8s_openapi::api::core::v1::Volume;
use log::{debug, info, warn};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Where a [`Session`] is in its lifecycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionState {
    Uninitialized,
    NamespaceReady,
    /// The issuer is running and every custom resource definition is established.
    DependenciesDeployed,
    /// The proxy has been submitted but is not ready yet.
    PrimaryDeployed,
    Ready,
    Redeploying,
    TearingDown,
    Closed,
}

#[derive(Debug, Clone)]
struct DeployedApp {
    /// Everything built for the app, recorded before submission so that a partial apply can be
    /// cleaned up.
    graph: ObjectGraph,
    key_bundle: KeyBundle,
    endpoint: Option<DeployedEndpoint>,
}

/// One end-to-end test session: a namespace holding the OIDC issuer, the proxy under test and any
/// auxiliary applications, together with the key material and endpoints of each.
///
/// A session is driven from a single task. Whatever happens during [`Session::setup`], callers are
/// expected to call [`Session::teardown`] afterwards.
pub struct Session<S> {
    config: Config,
    manager: DeployManager<S>,
    state: SessionState,
    scope: Option<SessionScope>,
    apps: BTreeMap<AppRole, DeployedApp>,
    crd_files: Vec<PathBuf>,
    ca_secrets: Vec<ObjectRef>,
}

fn keep_first(first_error: &mut Option<Error>, result: Result<()>) {
    if let Err(e) = result {
        warn!("teardown: {}", e);
        first_error.get_or_insert(e);
    }
}

impl<S: ObjectStore> Session<S> {
    pub fn new(config: Config, store: S) -> Self {
        let manager = DeployManager::new(store).with_poll_interval(config.poll_interval());
        Self {
            config,
            manager,
            state: SessionState::Uninitialized,
            scope: None,
            apps: BTreeMap::new(),
            crd_files: Vec::new(),
            ca_secrets: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &DeployManager<S> {
        &self.manager
    }

    pub fn scope(&self) -> Option<&SessionScope> {
        self.scope.as_ref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.scope.as_ref().map(SessionScope::namespace)
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    pub fn endpoint(&self, role: AppRole) -> Option<&DeployedEndpoint> {
        self.apps.get(&role)?.endpoint.as_ref()
    }

    pub fn key_bundle(&self, role: AppRole) -> Option<&KeyBundle> {
        self.apps.get(&role).map(|app| &app.key_bundle)
    }

    pub fn issuer_url(&self) -> Option<&DeployedEndpoint> {
        self.endpoint(AppRole::Issuer)
    }

    pub fn proxy_url(&self) -> Option<&DeployedEndpoint> {
        self.endpoint(AppRole::Proxy)
    }

    fn transition(&mut self, state: SessionState) {
        info!(
            "session '{}': {:?} -> {:?}",
            self.namespace().unwrap_or_default(),
            self.state,
            state
        );
        self.state = state;
    }

    fn require(&self, operation: &str, allowed: &[SessionState]) -> Result<()> {
        ensure!(
            allowed.contains(&self.state),
            error::StateSnafu {
                operation,
                state: self.state
            }
        );
        Ok(())
    }

    fn current_scope(&self, operation: &str) -> Result<SessionScope> {
        self.scope.clone().context(error::StateSnafu {
            operation,
            state: self.state,
        })
    }

    /// Create the namespace, deploy the issuer, register and establish every custom resource
    /// definition, then deploy the proxy and wait for it to be ready.
    pub async fn setup(&mut self) -> Result<()> {
        self.require("set up", &[SessionState::Uninitialized])?;

        info!("creating namespace '{}-*'", self.config.namespace_prefix);
        let scope = self
            .manager
            .create_namespace(&self.config.namespace_prefix)
            .await
            .context(error::ManagerSnafu {
                action: "create session namespace",
            })?;
        self.scope = Some(scope.clone());
        self.manager
            .wait_namespace(scope.namespace(), self.config.ready_timeout())
            .await
            .context(error::ManagerSnafu {
                action: "read back session namespace",
            })?;
        self.transition(SessionState::NamespaceReady);

        info!("deploying mock OIDC issuer");
        self.deploy(AppRole::Issuer, apps::issuer(scope.namespace()))
            .await?;

        for path in self.config.crd_paths() {
            info!("registering custom resource definition '{}'", path.display());
            let registration = self
                .manager
                .create_crd_file(&scope, &path)
                .await
                .context(error::ManagerSnafu {
                    action: format!("register '{}'", path.display()),
                })?;
            let name = registration.name;
            if registration.created {
                self.crd_files.push(path);
            }
            self.manager
                .wait_established(&name, self.config.establish_timeout())
                .await
                .context(error::ManagerSnafu {
                    action: format!("establish '{}'", name),
                })?;
        }
        self.transition(SessionState::DependenciesDeployed);

        info!("deploying {}", PROXY_NAME);
        self.deploy_proxy(Vec::new(), Vec::new()).await?;
        self.transition(SessionState::Ready);
        Ok(())
    }

    /// Delete everything the session created, proxy first and namespace last. Objects that are
    /// already gone are skipped, so this may be called from any state and any number of times.
    pub async fn teardown(&mut self) -> Result<()> {
        self.transition(SessionState::TearingDown);
        let mut first_error = None;

        info!("deleting {}", PROXY_NAME);
        keep_first(&mut first_error, self.delete_app(AppRole::Proxy).await);

        for path in self.crd_files.clone() {
            info!("deleting custom resource definition '{}'", path.display());
            let result = self
                .manager
                .delete_crd_file(&path)
                .await
                .context(error::ManagerSnafu {
                    action: format!("delete '{}'", path.display()),
                });
            keep_first(&mut first_error, result);
        }

        for role in [
            AppRole::Issuer,
            AppRole::FakeApiServer,
            AppRole::AuditWebhook,
        ] {
            keep_first(&mut first_error, self.delete_app(role).await);
        }

        for secret in self.ca_secrets.clone() {
            let result = self
                .manager
                .delete_object(&secret)
                .await
                .map(|_| ())
                .context(error::ManagerSnafu {
                    action: format!("delete {}", secret),
                });
            keep_first(&mut first_error, result);
        }

        if let Some(namespace) = self.namespace().map(str::to_string) {
            info!("deleting namespace '{}'", namespace);
            let result = self
                .manager
                .delete_namespace(&namespace)
                .await
                .map(|_| ())
                .context(error::ManagerSnafu {
                    action: format!("delete namespace '{}'", namespace),
                });
            keep_first(&mut first_error, result);
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                self.transition(SessionState::Closed);
                Ok(())
            }
        }
    }

    /// Replace the running proxy with one that additionally mounts `extra_volumes` and receives
    /// `extra_args`. The new proxy is submitted only after the old one, and its pods, are gone.
    pub async fn redeploy_primary(
        &mut self,
        extra_volumes: Vec<Volume>,
        extra_args: Vec<String>,
    ) -> Result<()> {
        self.require("redeploy the proxy", &[SessionState::Ready])?;
        let scope = self.current_scope("redeploy the proxy")?;
        self.transition(SessionState::Redeploying);

        info!("deleting {}", PROXY_NAME);
        self.delete_app(AppRole::Proxy).await?;
        self.manager
            .wait_deleted(scope.namespace(), PROXY_NAME, self.config.delete_timeout())
            .await
            .context(error::ManagerSnafu {
                action: format!("wait for {} to be deleted", PROXY_NAME),
            })?;
        self.apps.remove(&AppRole::Proxy);

        info!("deploying {} with extra args {:?}", PROXY_NAME, extra_args);
        self.deploy_proxy(extra_volumes, extra_args).await?;
        self.transition(SessionState::Ready);
        Ok(())
    }

    /// Deploy the fake API server. Returns its endpoint and a volume holding its CA certificate,
    /// meant to be passed to [`Session::redeploy_primary`].
    pub async fn deploy_fake_api_server(&mut self) -> Result<(DeployedEndpoint, Volume)> {
        self.deploy_auxiliary(
            AppRole::FakeApiServer,
            apps::fake_api_server(),
            "fake-apiserver",
            "fake-apiserver-ca",
        )
        .await
    }

    /// Deploy the audit webhook, logging to `log_path`. Returns its endpoint and a volume holding
    /// its CA certificate.
    pub async fn deploy_audit_webhook(
        &mut self,
        log_path: &str,
    ) -> Result<(DeployedEndpoint, Volume)> {
        self.deploy_auxiliary(
            AppRole::AuditWebhook,
            apps::audit_webhook(log_path),
            "audit-webhook-ca",
            "audit-webhook-ca",
        )
        .await
    }

    /// Client configuration for talking to `role` directly, trusting its CA. The proxy serves
    /// the cluster under test at `/<cluster name>`. Credentials are left to the caller.
    pub fn derived_config(&self, role: AppRole) -> Result<kube::Config> {
        let app = self
            .apps
            .get(&role)
            .context(error::NotDeployedSnafu { role })?;
        let endpoint = app
            .endpoint
            .as_ref()
            .context(error::NotDeployedSnafu { role })?;
        let url = match role {
            AppRole::Proxy => format!("{}/{}", endpoint, self.config.cluster_name),
            _ => endpoint.to_string(),
        };
        let cluster_url = url
            .parse::<http::Uri>()
            .context(error::UriSnafu { url: url.as_str() })?;
        let mut config = kube::Config::new(cluster_url);
        config.root_cert = Some(vec![app.key_bundle.ca_der().to_vec()]);
        Ok(config)
    }

    pub fn derived_client(&self, role: AppRole) -> Result<kube::Client> {
        kube::Client::try_from(self.derived_config(role)?).context(error::ClientSnafu { role })
    }

    async fn deploy(&mut self, role: AppRole, descriptor: AppDescriptor) -> Result<()> {
        self.submit(role, &descriptor).await?;
        self.await_ready(role).await
    }

    async fn deploy_proxy(
        &mut self,
        extra_volumes: Vec<Volume>,
        extra_args: Vec<String>,
    ) -> Result<()> {
        let kubeconfig = read_in_cluster_kubeconfig(&self.config)?;
        let issuer = self
            .apps
            .get(&AppRole::Issuer)
            .context(error::NotDeployedSnafu {
                role: AppRole::Issuer,
            })?;
        let issuer_url = issuer.endpoint.as_ref().context(error::NotDeployedSnafu {
            role: AppRole::Issuer,
        })?;
        let descriptor = apps::proxy(ProxyInputs {
            issuer_url,
            issuer_ca_pem: issuer.key_bundle.ca_pem(),
            client_id: &self.config.client_id,
            cluster_name: &self.config.cluster_name,
            kubeconfig: &kubeconfig,
            extra_volumes,
            extra_args,
        });

        self.submit(AppRole::Proxy, &descriptor).await?;
        self.transition(SessionState::PrimaryDeployed);
        self.await_ready(AppRole::Proxy).await
    }

    async fn deploy_auxiliary(
        &mut self,
        role: AppRole,
        descriptor: AppDescriptor,
        volume_name: &str,
        ca_secret_prefix: &str,
    ) -> Result<(DeployedEndpoint, Volume)> {
        let operation = format!("deploy {}", role);
        self.require(&operation, &[SessionState::Ready])?;
        let scope = self.current_scope(&operation)?;

        info!("deploying {}", role);
        self.deploy(role, descriptor).await?;
        let (endpoint, ca_pem) = match self.apps.get(&role) {
            Some(DeployedApp {
                endpoint: Some(endpoint),
                key_bundle,
                ..
            }) => (endpoint.clone(), key_bundle.ca_pem().to_vec()),
            _ => return error::NotDeployedSnafu { role }.fail(),
        };

        let secret = ca_secret(&scope, ca_secret_prefix, &ca_pem);
        let created = self
            .manager
            .create(&secret.into())
            .await
            .context(error::ManagerSnafu {
                action: format!("store the CA of {}", role),
            })?;
        debug!("CA of {} stored in {}", role, created.object_ref());
        self.ca_secrets.push(created.object_ref());
        Ok((endpoint, secret_volume(volume_name, created.name())))
    }

    /// Build the object graph of `descriptor`, submit it and derive the endpoint from the
    /// service the store returns.
    async fn submit(&mut self, role: AppRole, descriptor: &AppDescriptor) -> Result<()> {
        let scope = self.current_scope(&format!("deploy {}", role))?;
        let node_ips = match descriptor.exposure() {
            Exposure::ClusterInternal => Vec::new(),
            Exposure::External => {
                let node_ips = self
                    .manager
                    .store()
                    .node_internal_ips()
                    .await
                    .context(error::StoreSnafu {
                        action: "list node addresses",
                    })?;
                ensure!(!node_ips.is_empty(), error::NoNodeAddressSnafu { role });
                node_ips
            }
        };

        let BuiltApp { graph, key_bundle } =
            build_app(descriptor, &scope, &node_ips).context(error::BuildSnafu { role })?;
        self.apps.insert(
            role,
            DeployedApp {
                graph: graph.clone(),
                key_bundle,
                endpoint: None,
            },
        );

        let applied = self
            .manager
            .apply(&graph)
            .await
            .context(error::ManagerSnafu {
                action: format!("apply {}", role),
            })?;
        let service = applied
            .service(descriptor.name())
            .context(error::NotDeployedSnafu { role })?;
        let endpoint = DeployedEndpoint::from_service(
            service,
            scope.namespace(),
            descriptor.exposure(),
            &node_ips,
        )
        .context(error::EndpointSnafu { role })?;
        debug!("{} is served at {}", role, endpoint);
        if let Some(app) = self.apps.get_mut(&role) {
            app.endpoint = Some(endpoint);
        }
        Ok(())
    }

    /// Wait for the deployment of `role`, then for the configured settle delay.
    async fn await_ready(&self, role: AppRole) -> Result<()> {
        let scope = self.current_scope(&format!("wait for {}", role))?;
        self.manager
            .wait_ready(
                scope.namespace(),
                role.app_name(),
                self.config.ready_timeout(),
            )
            .await
            .context(error::ManagerSnafu {
                action: format!("wait for {} to be ready", role),
            })?;
        let settle_delay = self.config.settle_delay();
        if !settle_delay.is_zero() {
            debug!("letting {} settle for {:?}", role, settle_delay);
            tokio::time::sleep(settle_delay).await;
        }
        Ok(())
    }

    async fn delete_app(&self, role: AppRole) -> Result<()> {
        match self.apps.get(&role) {
            Some(app) => self
                .manager
                .delete(&app.graph)
                .await
                .context(error::ManagerSnafu {
                    action: format!("delete {}", role),
                }),
            None => Ok(()),
        }
    }
}
