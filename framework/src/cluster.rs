use crate::error::{self, Result};
use crate::Config;
use e2e_model::clients::KubeStore;
use e2e_model::constants::SECURE_PORT;
use kube::config::Kubeconfig;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use snafu::ResultExt;

/// Where the proxy finds the kubeconfig of the cluster under test.
pub const IN_CLUSTER_KUBECONFIG_DIR: &str = "/etc/kind-kubeconfig";
pub const IN_CLUSTER_KUBECONFIG: &str = "/etc/kind-kubeconfig/config";

/// Matches the loopback address `kind` writes into the kubeconfig it hands to the host.
const LOOPBACK_SERVER_REGEX: &str = r"^https://127\.0\.0\.1:\d+/?$";

lazy_static! {
    static ref LOOPBACK_SERVER: Regex = {
        #[allow(clippy::unwrap_used)]
        Regex::new(LOOPBACK_SERVER_REGEX).unwrap()
    };
}

/// The kubeconfig of `config`. Without an explicit path the files listed in `KUBECONFIG` are
/// merged in order, falling back to `$HOME/.kube/config`.
pub fn read_kubeconfig(config: &Config) -> Result<Kubeconfig> {
    match &config.kubeconfig_path {
        Some(path) => {
            debug!("reading kubeconfig '{}'", path.display());
            Kubeconfig::read_from(path).context(error::KubeconfigSnafu)
        }
        None => Kubeconfig::read().context(error::KubeconfigSnafu),
    }
}

/// Rewrites a host-side kubeconfig so that it can be used from inside the cluster: loopback API
/// server addresses are replaced by the control plane's in-cluster name.
pub fn in_cluster_kubeconfig(
    mut kubeconfig: Kubeconfig,
    control_plane_host: &str,
) -> Result<String> {
    let replacement = format!("https://{}:{}", control_plane_host, SECURE_PORT);
    for named in kubeconfig.clusters.iter_mut() {
        let server = named
            .cluster
            .as_mut()
            .and_then(|cluster| cluster.server.as_mut());
        if let Some(server) = server {
            if LOOPBACK_SERVER.is_match(server.as_str()) {
                debug!("cluster '{}' is served at '{}'", named.name, replacement);
                *server = replacement.clone();
            }
        }
    }
    serde_yaml::to_string(&kubeconfig).context(error::KubeconfigSerializeSnafu)
}

/// Read the kubeconfig of `config` and rewrite it with [`in_cluster_kubeconfig`].
pub fn read_in_cluster_kubeconfig(config: &Config) -> Result<String> {
    in_cluster_kubeconfig(read_kubeconfig(config)?, &config.control_plane_host)
}

/// The proxy's cluster configuration file: a single cluster reached through the in-cluster
/// kubeconfig.
pub fn clusters_config(cluster_name: &str) -> String {
    format!(
        "clusters:\n  - name: {}\n    kubeconfig: \"{}\"\n",
        cluster_name, IN_CLUSTER_KUBECONFIG
    )
}

/// Connect to the cluster named by the kubeconfig of `config`.
pub async fn connect(config: &Config) -> Result<KubeStore> {
    KubeStore::from_custom_kubeconfig(read_kubeconfig(config)?)
        .await
        .context(error::StoreConnectSnafu)
}
