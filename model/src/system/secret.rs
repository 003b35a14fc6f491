use super::SessionScope;
use crate::constants::CA_FILE;
use crate::ConfigSecret;
use k8s_openapi::api::core::v1::{Secret, SecretVolumeSource, Volume};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use maplit::btreemap;

/// Defines the secret backing a [`ConfigSecret`].
pub fn config_secret(scope: &SessionScope, secret: &ConfigSecret) -> Secret {
    Secret {
        metadata: scope.namespaced_meta(&secret.name),
        data: Some(
            secret
                .files
                .iter()
                .map(|(file, contents)| (file.clone(), ByteString(contents.clone())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Defines a secret holding a CA certificate under `ca.pem`. The store appends a random suffix to
/// `prefix`.
pub fn ca_secret(scope: &SessionScope, prefix: &str, ca_pem: &[u8]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: None,
            generate_name: Some(format!("{}-", prefix)),
            ..scope.namespaced_meta(String::new())
        },
        data: Some(btreemap! {
            CA_FILE.to_string() => ByteString(ca_pem.to_vec()),
        }),
        ..Default::default()
    }
}

/// A volume exposing the secret `secret_name`.
pub fn secret_volume<S1, S2>(volume_name: S1, secret_name: S2) -> Volume
where
    S1: Into<String>,
    S2: Into<String>,
{
    Volume {
        name: volume_name.into(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
