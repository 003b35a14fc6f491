/// Helper macro to avoid retyping the base domain-like name of the harness when creating further
/// string constants from it. When given no parameters, this returns the base domain-like name.
/// When given a string literal parameter it adds `/parameter` to the end.
macro_rules! harness {
    () => {
        "e2e.harness.io"
    };
    ($s:literal) => {
        concat!(harness!(), "/", $s)
    };
}

// System identifiers
pub const HARNESS: &str = harness!();

// Label keys
pub const LABEL_APP: &str = "app";
pub const LABEL_SESSION: &str = harness!("session");

// Standard tags https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
pub const APP_NAME: &str = "app.kubernetes.io/name";
pub const APP_PART_OF: &str = "app.kubernetes.io/part-of";
pub const APP_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

// TLS material mounted into every deployed workload
pub const TLS_VOLUME: &str = "tls";
pub const TLS_MOUNT_PATH: &str = "/tls";
pub const TLS_CERT_FILE: &str = "cert.pem";
pub const TLS_KEY_FILE: &str = "key.pem";
pub const CA_FILE: &str = "ca.pem";

// Networking
pub const SECURE_PORT: i32 = 6443;
pub const SERVICE_DOMAIN: &str = "svc.cluster.local";
pub const SERVICE_TYPE_CLUSTER_IP: &str = "ClusterIP";
pub const SERVICE_TYPE_NODE_PORT: &str = "NodePort";
pub const NODE_INTERNAL_IP: &str = "InternalIP";

// Condition types and values reported by the API server
pub const CONDITION_ESTABLISHED: &str = "Established";
pub const CONDITION_TRUE: &str = "True";

// RBAC
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

#[test]
fn harness_constants_macro_test() {
    assert_eq!("e2e.harness.io", harness!());
    assert_eq!("e2e.harness.io/session", LABEL_SESSION);
    assert_eq!("e2e.harness.io/foo", harness!("foo"));
}
