use crate::error::{self, Result};
use serde::Deserialize;
use snafu::ResultExt;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix of every environment variable read by [`Config::from_env`].
pub const ENV_PREFIX: &str = "E2E_";

/// Settings for a test session, read from `E2E_`-prefixed environment variables. Every setting
/// has a default.
///
/// # Example
///
/// ```text
/// E2E_KUBECONFIG_PATH=/tmp/kind/kubeconfig.yaml
/// E2E_CRD_FILES=deploy/crds/a.yaml,deploy/crds/b.yaml
/// E2E_READY_TIMEOUT_SECS=60
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    /// The kubeconfig of the cluster under test. When unset, `$KUBECONFIG` and then
    /// `$HOME/.kube/config` are used.
    #[serde(default)]
    pub kubeconfig_path: Option<PathBuf>,

    /// Custom resource definition files are resolved against this directory.
    #[serde(default = "repo_root")]
    pub repo_root: PathBuf,

    /// Custom resource definition files registered for every session, relative to `repo_root`.
    #[serde(default = "crd_files")]
    pub crd_files: Vec<PathBuf>,

    /// Session namespaces are named `<namespace_prefix>-<random suffix>`.
    #[serde(default = "namespace_prefix")]
    pub namespace_prefix: String,

    /// The name under which the proxy serves the cluster under test.
    #[serde(default = "cluster_name")]
    pub cluster_name: String,

    /// The host name of the control plane as seen from inside the cluster.
    #[serde(default = "control_plane_host")]
    pub control_plane_host: String,

    #[serde(default = "client_id")]
    pub client_id: String,

    #[serde(default = "ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    #[serde(default = "establish_timeout_secs")]
    pub establish_timeout_secs: u64,

    #[serde(default = "delete_timeout_secs")]
    pub delete_timeout_secs: u64,

    #[serde(default = "poll_interval_millis")]
    pub poll_interval_millis: u64,

    /// Extra time to wait after a deployment reports ready before its endpoint is handed out.
    #[serde(default)]
    pub settle_delay_millis: u64,
}

fn repo_root() -> PathBuf {
    PathBuf::from(".")
}

fn crd_files() -> Vec<PathBuf> {
    [
        "capiclusterrolebindings",
        "capiclusterroles",
        "capirolebindings",
        "capiroles",
    ]
    .iter()
    .map(|plural| PathBuf::from(format!("deploy/crds/rbac.platformengineers.io_{}.yaml", plural)))
    .collect()
}

fn namespace_prefix() -> String {
    String::from("kube-oidc-proxy-e2e")
}

fn cluster_name() -> String {
    String::from("kube-oidc-proxy-e2e")
}

fn control_plane_host() -> String {
    String::from("kube-oidc-proxy-e2e-control-plane")
}

fn client_id() -> String {
    String::from("kube-oidc-proxy-e2e-client_id")
}

fn ready_timeout_secs() -> u64 {
    20
}

fn establish_timeout_secs() -> u64 {
    30
}

fn delete_timeout_secs() -> u64 {
    30
}

fn poll_interval_millis() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kubeconfig_path: None,
            repo_root: repo_root(),
            crd_files: crd_files(),
            namespace_prefix: namespace_prefix(),
            cluster_name: cluster_name(),
            control_plane_host: control_plane_host(),
            client_id: client_id(),
            ready_timeout_secs: ready_timeout_secs(),
            establish_timeout_secs: establish_timeout_secs(),
            delete_timeout_secs: delete_timeout_secs(),
            poll_interval_millis: poll_interval_millis(),
            settle_delay_millis: 0,
        }
    }
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env()
            .context(error::ConfigSnafu)
    }

    /// Read the configuration from `vars`, which are named as in the environment, prefix
    /// included.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .context(error::ConfigSnafu)
    }

    /// Custom resource definition files, resolved against `repo_root`.
    pub fn crd_paths(&self) -> Vec<PathBuf> {
        self.crd_files
            .iter()
            .map(|file| self.repo_root.join(file))
            .collect()
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn establish_timeout(&self) -> Duration {
        Duration::from_secs(self.establish_timeout_secs)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_millis)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.ready_timeout(), Duration::from_secs(20));
        assert_eq!(config.establish_timeout(), Duration::from_secs(30));
        assert_eq!(config.delete_timeout(), Duration::from_secs(30));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(config.crd_paths().len(), 4);
        assert_eq!(
            config.crd_paths()[3],
            PathBuf::from("./deploy/crds/rbac.platformengineers.io_capiroles.yaml")
        );
    }

    #[test]
    fn overrides() {
        let config = Config::from_vars(vars(&[
            ("E2E_KUBECONFIG_PATH", "/tmp/kubeconfig"),
            ("E2E_REPO_ROOT", "/src"),
            ("E2E_CRD_FILES", "a.yaml,b.yaml"),
            ("E2E_READY_TIMEOUT_SECS", "5"),
            ("E2E_SETTLE_DELAY_MILLIS", "2000"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();
        assert_eq!(config.kubeconfig_path, Some(PathBuf::from("/tmp/kubeconfig")));
        assert_eq!(
            config.crd_paths(),
            vec![PathBuf::from("/src/a.yaml"), PathBuf::from("/src/b.yaml")]
        );
        assert_eq!(config.ready_timeout(), Duration::from_secs(5));
        assert_eq!(config.settle_delay(), Duration::from_secs(2));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(Config::from_vars(vars(&[("E2E_POLL_INTERVAL_MILLIS", "soon")])).is_err());
    }
}
