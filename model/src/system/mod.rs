/// Encapsulates the k8s object definitions the harness creates for a session
mod access;
mod app;
mod namespace;
mod secret;

pub use access::{access_objects, cluster_role_name};
pub use app::{build_app, BuiltApp};
pub use namespace::{session_namespace, SessionScope};
pub use secret::{ca_secret, config_secret, secret_volume};
