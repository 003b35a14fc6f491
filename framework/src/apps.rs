/*!

The applications a session deploys: the OIDC issuer double, the proxy under test, and the
auxiliary fake API server and audit webhook. Each is described by an [`AppDescriptor`]; images are
expected to be preloaded into the cluster.

!*/

use crate::cluster::{clusters_config, IN_CLUSTER_KUBECONFIG, IN_CLUSTER_KUBECONFIG_DIR};
use e2e_model::constants::{CA_FILE, SECURE_PORT, TLS_CERT_FILE, TLS_KEY_FILE, TLS_MOUNT_PATH};
use e2e_model::{
    AccessGrant, AppDescriptor, ConfigSecret, DeployedEndpoint, Exposure, GrantSubject,
    ReadinessProbe,
};
use k8s_openapi::api::core::v1::Volume;
use k8s_openapi::api::rbac::v1::PolicyRule;
use std::fmt::{Display, Formatter};

pub const PROXY_NAME: &str = "kube-oidc-proxy-e2e";
pub const ISSUER_NAME: &str = "oidc-issuer-e2e";
pub const FAKE_API_SERVER_NAME: &str = "fake-apiserver-e2e";
pub const AUDIT_WEBHOOK_NAME: &str = "audit-webhook-e2e";

/// Images are loaded into the cluster ahead of time and never pulled.
const PULL_NEVER: &str = "Never";

/// The user allowed to impersonate the test identities.
pub const IMPERSONATING_USER: &str = "user@example.com";

const PROXY_HEALTH_PORT: i32 = 8080;
const AUDIT_WEBHOOK_SERVER: &str = "https://127.0.0.1:8989";

/// The part each deployed application plays in a session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AppRole {
    /// The OIDC identity provider double.
    Issuer,
    /// The workload under test.
    Proxy,
    FakeApiServer,
    AuditWebhook,
}

impl AppRole {
    pub fn app_name(self) -> &'static str {
        match self {
            AppRole::Issuer => ISSUER_NAME,
            AppRole::Proxy => PROXY_NAME,
            AppRole::FakeApiServer => FAKE_API_SERVER_NAME,
            AppRole::AuditWebhook => AUDIT_WEBHOOK_NAME,
        }
    }
}

impl Display for AppRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.app_name())
    }
}

fn tls_args() -> Vec<String> {
    vec![
        format!("--secure-port={}", SECURE_PORT),
        format!("--tls-cert-file={}/{}", TLS_MOUNT_PATH, TLS_CERT_FILE),
        format!("--tls-private-key-file={}/{}", TLS_MOUNT_PATH, TLS_KEY_FILE),
    ]
}

/// A cluster-internal helper whose container runs `subcommand` with TLS flags and `extra_args`.
fn helper_app(name: &str, subcommand: &str, extra_args: Vec<String>) -> AppDescriptor {
    AppDescriptor::new(name, name)
        .with_image_pull_policy(PULL_NEVER)
        .with_args([subcommand.to_string()])
        .with_args(tls_args())
        .with_args(extra_args)
        .with_exposure(Exposure::ClusterInternal)
}

/// The issuer serves OIDC discovery at its own in-cluster address.
pub fn issuer(namespace: &str) -> AppDescriptor {
    let issuer_url = format!(
        "https://{}:{}",
        e2e_model::service_host(ISSUER_NAME, namespace),
        SECURE_PORT
    );
    helper_app(
        ISSUER_NAME,
        "oidc-issuer",
        vec![format!("--issuer-url={}", issuer_url)],
    )
}

pub fn fake_api_server() -> AppDescriptor {
    helper_app(FAKE_API_SERVER_NAME, "fake-apiserver", Vec::new())
}

/// The audit webhook writes every event it receives to `log_path` inside its container.
pub fn audit_webhook(log_path: &str) -> AppDescriptor {
    helper_app(
        AUDIT_WEBHOOK_NAME,
        "audit-webhook",
        vec![format!("--audit-file-path={}", log_path)],
    )
}

/// Everything the proxy descriptor depends on that is only known once a session is running.
#[derive(Debug, Clone)]
pub struct ProxyInputs<'a> {
    pub issuer_url: &'a DeployedEndpoint,
    pub issuer_ca_pem: &'a [u8],
    pub client_id: &'a str,
    pub cluster_name: &'a str,
    /// The kubeconfig of the cluster under test, already rewritten for in-cluster use.
    pub kubeconfig: &'a str,
    pub extra_volumes: Vec<Volume>,
    pub extra_args: Vec<String>,
}

fn rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    let strings = |values: &[&str]| values.iter().map(|value| value.to_string()).collect();
    PolicyRule {
        api_groups: Some(strings(api_groups)),
        resources: Some(strings(resources)),
        verbs: strings(verbs),
        ..PolicyRule::default()
    }
}

fn named_rule(api_group: &str, resource: &str, name: &str) -> PolicyRule {
    PolicyRule {
        resource_names: Some(vec![name.to_string()]),
        ..rule(&[api_group], &[resource], &["impersonate"])
    }
}

/// What the proxy's own service account may do: impersonate, review tokens and access, and
/// forward any request.
fn proxy_grant() -> AccessGrant {
    AccessGrant::new("proxy")
        .with_rule(rule(
            &[""],
            &["users", "groups", "serviceaccounts"],
            &["impersonate"],
        ))
        .with_rule(rule(
            &["authentication.k8s.io"],
            &[
                "userextras/scopes",
                "tokenreviews",
                "userextras/originaluser.jetstack.io-user",
                "userextras/originaluser.jetstack.io-groups",
                "userextras/originaluser.jetstack.io-extra",
                "userextras/oktoimpersonateextra",
            ],
            &["impersonate", "create"],
        ))
        .with_rule(rule(
            &["authorization.k8s.io"],
            &["subjectaccessreviews"],
            &["create"],
        ))
        .with_rule(rule(&["*"], &["*"], &["*"]))
        .bound_to(GrantSubject::AppServiceAccount)
}

/// Lets the test user impersonate a fixed set of identities.
fn impersonate_grant() -> AccessGrant {
    AccessGrant::new("impersonate")
        .with_rule(named_rule("", "users", "ok-to-impersonate@nodomain.dev"))
        .with_rule(named_rule("", "groups", "ok-to-impersonate-group"))
        .with_rule(named_rule(
            "authentication.k8s.io",
            "userextras/oktoimpersonateextra",
            "foo",
        ))
        .bound_to(GrantSubject::User(IMPERSONATING_USER.to_string()))
}

/// The proxy, exposed outside the cluster, authenticating against the issuer and forwarding to
/// the cluster described by `inputs.kubeconfig`.
pub fn proxy(inputs: ProxyInputs<'_>) -> AppDescriptor {
    let oidc_ca = ConfigSecret::new("oidc-ca", "/oidc").with_file(CA_FILE, inputs.issuer_ca_pem);
    let oidc_args = vec![
        format!("--oidc-client-id={}", inputs.client_id),
        format!("--oidc-issuer-url={}", inputs.issuer_url),
        "--oidc-username-claim=email".to_string(),
        "--oidc-groups-claim=groups".to_string(),
        format!("--oidc-ca-file={}/{}", oidc_ca.mount_path, CA_FILE),
        "--v=10".to_string(),
        format!("--audit-webhook-server={}", AUDIT_WEBHOOK_SERVER),
        "--clusters-config=/etc/clusters-config/clusters.yaml".to_string(),
    ];

    AppDescriptor::new(PROXY_NAME, PROXY_NAME)
        .with_image_pull_policy(PULL_NEVER)
        .with_command(["./proxy"])
        .with_args(tls_args())
        .with_args(oidc_args)
        .with_args(inputs.extra_args)
        .with_env("KUBECONFIG", IN_CLUSTER_KUBECONFIG)
        .with_container_ports([SECURE_PORT, PROXY_HEALTH_PORT])
        .with_readiness(ReadinessProbe::http_get("/ready", PROXY_HEALTH_PORT))
        .with_exposure(Exposure::External)
        .with_config_secret(oidc_ca)
        .with_config_secret(
            ConfigSecret::new("kind-kubeconfig", IN_CLUSTER_KUBECONFIG_DIR)
                .with_file("config", inputs.kubeconfig),
        )
        .with_config_secret(
            ConfigSecret::new("clusters-config", "/etc/clusters-config")
                .with_file("clusters.yaml", clusters_config(inputs.cluster_name)),
        )
        .with_config_secret(
            ConfigSecret::new("rbac-config", "/etc/rbac-config").with_file("rbac.yaml", ""),
        )
        .with_extra_volumes(inputs.extra_volumes)
        .with_access(proxy_grant())
        .with_access(impersonate_grant())
}
