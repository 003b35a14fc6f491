use crate::constants::{SECURE_PORT, SERVICE_TYPE_CLUSTER_IP, SERVICE_TYPE_NODE_PORT};
use k8s_openapi::api::core::v1::Volume;
use k8s_openapi::api::rbac::v1::PolicyRule;
use std::collections::BTreeMap;

/// How a deployed application's service is reachable.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Exposure {
    /// Reachable only from inside the cluster through its service DNS name.
    ClusterInternal,
    /// Reachable from outside the cluster through a node address and an allocated node port.
    External,
}

impl Exposure {
    pub fn service_type(&self) -> &'static str {
        match self {
            Exposure::ClusterInternal => SERVICE_TYPE_CLUSTER_IP,
            Exposure::External => SERVICE_TYPE_NODE_PORT,
        }
    }
}

/// An HTTP readiness check performed by the kubelet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReadinessProbe {
    pub path: String,
    pub port: i32,
    pub initial_delay_seconds: i32,
    pub period_seconds: i32,
}

impl ReadinessProbe {
    pub fn http_get<S: Into<String>>(path: S, port: i32) -> Self {
        Self {
            path: path.into(),
            port,
            initial_delay_seconds: 1,
            period_seconds: 3,
        }
    }
}

/// A secret holding configuration files, mounted read-only into the workload at `mount_path`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConfigSecret {
    pub name: String,
    pub mount_path: String,
    pub files: BTreeMap<String, Vec<u8>>,
}

impl ConfigSecret {
    pub fn new<S1, S2>(name: S1, mount_path: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file<S, B>(mut self, file_name: S, contents: B) -> Self
    where
        S: Into<String>,
        B: Into<Vec<u8>>,
    {
        self.files.insert(file_name.into(), contents.into());
        self
    }
}

/// Who an [`AccessGrant`] is bound to.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum GrantSubject {
    /// The service account the application runs as.
    AppServiceAccount,
    User(String),
    Group(String),
}

/// A cluster-wide permission set granted for the lifetime of a session. Each grant becomes a
/// `ClusterRole` and a `ClusterRoleBinding` owned by the session namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessGrant {
    pub name: String,
    pub rules: Vec<PolicyRule>,
    pub subjects: Vec<GrantSubject>,
}

impl AccessGrant {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            subjects: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn bound_to(mut self, subject: GrantSubject) -> Self {
        self.subjects.push(subject);
        self
    }
}

/// Everything needed to stand up one application: its container, how it is exposed, and the
/// supporting objects it depends on. Constructed through the `with_*` methods and not changed
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AppDescriptor {
    pub(crate) name: String,
    pub(crate) image: String,
    pub(crate) image_pull_policy: Option<String>,
    pub(crate) command: Vec<String>,
    pub(crate) args: Vec<String>,
    pub(crate) env: Vec<(String, String)>,
    pub(crate) container_ports: Vec<i32>,
    pub(crate) service_port: i32,
    pub(crate) readiness: Option<ReadinessProbe>,
    pub(crate) exposure: Exposure,
    pub(crate) replicas: i32,
    pub(crate) config_secrets: Vec<ConfigSecret>,
    pub(crate) extra_volumes: Vec<Volume>,
    pub(crate) access: Vec<AccessGrant>,
}

impl AppDescriptor {
    /// A single replica of `image`, exposed inside the cluster on the secure port.
    pub fn new<S1, S2>(name: S1, image: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            name: name.into(),
            image: image.into(),
            image_pull_policy: None,
            command: Vec::new(),
            args: Vec::new(),
            env: Vec::new(),
            container_ports: vec![SECURE_PORT],
            service_port: SECURE_PORT,
            readiness: None,
            exposure: Exposure::ClusterInternal,
            replicas: 1,
            config_secrets: Vec::new(),
            extra_volumes: Vec::new(),
            access: Vec::new(),
        }
    }

    pub fn with_image_pull_policy<S: Into<String>>(mut self, policy: S) -> Self {
        self.image_pull_policy = Some(policy.into());
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Appends `args` to the container arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env<S1, S2>(mut self, name: S1, value: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        self.env.push((name.into(), value.into()));
        self
    }

    /// Replaces the declared container ports. The first port is not special; the service always
    /// targets `service_port`.
    pub fn with_container_ports<I: IntoIterator<Item = i32>>(mut self, ports: I) -> Self {
        self.container_ports = ports.into_iter().collect();
        self
    }

    pub fn with_service_port(mut self, port: i32) -> Self {
        self.service_port = port;
        self
    }

    pub fn with_readiness(mut self, probe: ReadinessProbe) -> Self {
        self.readiness = Some(probe);
        self
    }

    pub fn with_exposure(mut self, exposure: Exposure) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn with_config_secret(mut self, secret: ConfigSecret) -> Self {
        self.config_secrets.push(secret);
        self
    }

    /// Volumes supplied by the caller. Each is mounted read-only at `/<volume name>`.
    pub fn with_extra_volumes<I: IntoIterator<Item = Volume>>(mut self, volumes: I) -> Self {
        self.extra_volumes.extend(volumes);
        self
    }

    pub fn with_access(mut self, grant: AccessGrant) -> Self {
        self.access.push(grant);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn exposure(&self) -> Exposure {
        self.exposure
    }

    pub fn service_port(&self) -> i32 {
        self.service_port
    }

    pub fn readiness(&self) -> Option<&ReadinessProbe> {
        self.readiness.as_ref()
    }

    pub fn config_secrets(&self) -> &[ConfigSecret] {
        &self.config_secrets
    }

    pub fn extra_volumes(&self) -> &[Volume] {
        &self.extra_volumes
    }

    pub fn access(&self) -> &[AccessGrant] {
        &self.access
    }
}
