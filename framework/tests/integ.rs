#![cfg(feature = "integ")]
#![cfg(test)]
//! Runs a full session against the kind cluster named by `E2E_KUBECONFIG_PATH` (or `KUBECONFIG`).
//! The issuer, proxy and auxiliary images must already be loaded into the cluster, and
//! `E2E_REPO_ROOT` must point at a checkout holding the custom resource definitions.

use e2e_framework::{cluster, init_logger, AppRole, Config, Session, SessionState};
use e2e_model::clients::{HttpStatusCode, ObjectStore, StatusCode};
use k8s_openapi::api::core::v1::Namespace;
use kube::Api;

async fn session() -> Session<e2e_model::clients::KubeStore> {
    init_logger();
    let config = Config::from_env().unwrap();
    let store = cluster::connect(&config).await.unwrap();
    Session::new(config, store)
}

#[tokio::test]
async fn session_lifecycle() {
    let mut session = session().await;
    let setup = session.setup().await;
    let namespace = session.namespace().map(str::to_string);
    let teardown = session.teardown().await;
    setup.unwrap();
    teardown.unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    let namespace = namespace.unwrap();
    let remaining = session
        .manager()
        .store()
        .get_namespace(&namespace)
        .await
        .unwrap();
    // The namespace may still be terminating, but it must not be active.
    if let Some(ns) = remaining {
        let phase = ns.status.and_then(|status| status.phase);
        assert_eq!(phase.as_deref(), Some("Terminating"));
    }
}

#[tokio::test]
async fn proxy_serves_the_cluster() {
    let mut session = session().await;
    let result = async {
        session.setup().await?;
        let (_, volume) = session.deploy_fake_api_server().await?;
        session.redeploy_primary(vec![volume], Vec::new()).await?;
        session.derived_client(AppRole::Proxy)
    }
    .await;

    // Requests without a token reach the proxy over TLS and are refused by it.
    let listed = match result {
        Ok(client) => Ok(Api::<Namespace>::all(client)
            .list(&Default::default())
            .await),
        Err(e) => Err(e),
    };
    let teardown = session.teardown().await;

    let listed = listed.unwrap();
    assert!(listed.is_status_code(StatusCode::UNAUTHORIZED), "{:?}", listed);
    teardown.unwrap();
}
