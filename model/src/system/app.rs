use super::{access_objects, config_secret, secret_volume, SessionScope};
use crate::constants::{
    APP_NAME, APP_PART_OF, HARNESS, LABEL_APP, TLS_CERT_FILE, TLS_KEY_FILE, TLS_MOUNT_PATH,
    TLS_VOLUME,
};
use crate::endpoint::service_host;
use crate::error::Result;
use crate::{AppDescriptor, KeyBundle, ObjectGraph};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HTTPGetAction, PodSpec, PodTemplateSpec, Probe, Secret,
    Service, ServiceAccount, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use log::debug;
use maplit::btreemap;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// The declarative result of building an application: every object to submit and the key
/// material the TLS secret was made from.
#[derive(Debug, Clone)]
pub struct BuiltApp {
    pub graph: ObjectGraph,
    pub key_bundle: KeyBundle,
}

/// Build the object graph for `app` in `scope`.
///
/// The serving certificate covers the service's in-cluster DNS name and `node_ips`, which the
/// caller resolves beforehand for externally exposed applications. No remote call is made.
pub fn build_app(
    app: &AppDescriptor,
    scope: &SessionScope,
    node_ips: &[IpAddr],
) -> Result<BuiltApp> {
    let host = service_host(&app.name, scope.namespace());
    let key_bundle = KeyBundle::new_self_signed(&host, node_ips)?;
    debug!(
        "building '{}' in '{}' ({} config secrets, {} extra volumes, {} grants)",
        app.name,
        scope.namespace(),
        app.config_secrets.len(),
        app.extra_volumes.len(),
        app.access.len()
    );

    let mut graph = ObjectGraph::new();
    graph.push(tls_secret(app, scope, &key_bundle));
    for secret in &app.config_secrets {
        graph.push(config_secret(scope, secret));
    }
    graph.push(ServiceAccount {
        metadata: scope.namespaced_meta(&app.name),
        ..Default::default()
    });
    for object in access_objects(&app.name, scope, &app.access) {
        graph.push(object);
    }
    graph.push(service(app, scope));
    graph.push(deployment(app, scope));

    Ok(BuiltApp { graph, key_bundle })
}

fn app_labels(app: &AppDescriptor) -> BTreeMap<String, String> {
    btreemap! {
        LABEL_APP.to_string() => app.name.clone(),
    }
}

fn tls_secret(app: &AppDescriptor, scope: &SessionScope, key_bundle: &KeyBundle) -> Secret {
    Secret {
        metadata: scope.namespaced_meta(&app.name),
        data: Some(btreemap! {
            TLS_CERT_FILE.to_string() => ByteString(key_bundle.cert_pem().to_vec()),
            TLS_KEY_FILE.to_string() => ByteString(key_bundle.key_pem().to_vec()),
        }),
        ..Default::default()
    }
}

fn service(app: &AppDescriptor, scope: &SessionScope) -> Service {
    Service {
        metadata: scope.namespaced_meta(&app.name),
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port: app.service_port,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(app.service_port)),
                ..Default::default()
            }]),
            type_: Some(app.exposure.service_type().to_string()),
            selector: Some(app_labels(app)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Every volume of the pod and the matching read-only mounts, computed in one pass.
fn volumes_and_mounts(app: &AppDescriptor) -> (Vec<Volume>, Vec<VolumeMount>) {
    let mut volumes = vec![secret_volume(TLS_VOLUME, &app.name)];
    let mut mounts = vec![read_only_mount(TLS_VOLUME, TLS_MOUNT_PATH)];

    for secret in &app.config_secrets {
        volumes.push(secret_volume(&secret.name, &secret.name));
        mounts.push(read_only_mount(&secret.name, &secret.mount_path));
    }

    for volume in &app.extra_volumes {
        mounts.push(read_only_mount(&volume.name, format!("/{}", volume.name)));
        volumes.push(volume.clone());
    }

    (volumes, mounts)
}

fn read_only_mount<S1, S2>(name: S1, mount_path: S2) -> VolumeMount
where
    S1: Into<String>,
    S2: Into<String>,
{
    VolumeMount {
        name: name.into(),
        mount_path: mount_path.into(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn container(app: &AppDescriptor, mounts: Vec<VolumeMount>) -> Container {
    let non_empty = |values: &Vec<String>| {
        if values.is_empty() {
            None
        } else {
            Some(values.clone())
        }
    };

    Container {
        name: app.name.clone(),
        image: Some(app.image.clone()),
        image_pull_policy: app.image_pull_policy.clone(),
        command: non_empty(&app.command),
        args: non_empty(&app.args),
        env: if app.env.is_empty() {
            None
        } else {
            Some(
                app.env
                    .iter()
                    .map(|(name, value)| EnvVar {
                        name: name.clone(),
                        value: Some(value.clone()),
                        ..Default::default()
                    })
                    .collect(),
            )
        },
        ports: Some(
            app.container_ports
                .iter()
                .map(|port| ContainerPort {
                    container_port: *port,
                    ..Default::default()
                })
                .collect(),
        ),
        readiness_probe: app.readiness.as_ref().map(|probe| Probe {
            http_get: Some(HTTPGetAction {
                path: Some(probe.path.clone()),
                port: IntOrString::Int(probe.port),
                ..Default::default()
            }),
            initial_delay_seconds: Some(probe.initial_delay_seconds),
            period_seconds: Some(probe.period_seconds),
            ..Default::default()
        }),
        volume_mounts: Some(mounts),
        ..Default::default()
    }
}

fn deployment(app: &AppDescriptor, scope: &SessionScope) -> Deployment {
    let (volumes, mounts) = volumes_and_mounts(app);
    let mut labels = scope.labels();
    labels.extend(app_labels(app));
    labels.insert(APP_NAME.to_string(), app.name.clone());
    labels.insert(APP_PART_OF.to_string(), HARNESS.to_string());

    Deployment {
        metadata: ObjectMeta {
            labels: Some(labels),
            ..scope.namespaced_meta(&app.name)
        },
        spec: Some(DeploymentSpec {
            replicas: Some(app.replicas),
            selector: LabelSelector {
                match_labels: Some(app_labels(app)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(app)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(app.name.clone()),
                    containers: vec![container(app, mounts)],
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
