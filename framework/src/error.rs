use crate::{AppRole, SessionState};
use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for the framework.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to build {}: {}", role, source))]
    Build {
        role: AppRole,
        source: e2e_model::Error,
    },

    #[snafu(display("Unable to create a client for {}: {}", role, source))]
    Client { role: AppRole, source: kube::Error },

    #[snafu(display("Unable to parse environment settings: {}", source))]
    Config { source: envy::Error },

    #[snafu(display("Unable to derive endpoint of {}: {}", role, source))]
    Endpoint {
        role: AppRole,
        source: e2e_model::Error,
    },

    #[snafu(display("Unable to read kubeconfig: {}", source))]
    Kubeconfig {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Unable to serialize the in-cluster kubeconfig: {}", source))]
    KubeconfigSerialize { source: serde_yaml::Error },

    #[snafu(display("Unable to {}: {}", action, source))]
    Manager {
        action: String,
        source: e2e_model::manager::Error,
    },

    #[snafu(display("No node reports an internal IP, {} cannot be exposed", role))]
    NoNodeAddress { role: AppRole },

    #[snafu(display("{} has not been deployed", role))]
    NotDeployed { role: AppRole },

    #[snafu(display("Unable to {} while the session is {:?}", operation, state))]
    State {
        operation: String,
        state: SessionState,
    },

    #[snafu(display("Unable to {}: {}", action, source))]
    Store {
        action: String,
        source: e2e_model::clients::Error,
    },

    #[snafu(display("Unable to connect to the cluster: {}", source))]
    StoreConnect { source: e2e_model::clients::Error },

    #[snafu(display("'{}' is not a valid API server address: {}", url, source))]
    Uri {
        url: String,
        source: http::uri::InvalidUri,
    },
}
