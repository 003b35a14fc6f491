/*!

This library models the objects an end-to-end test session deploys into a Kubernetes cluster and
drives them through the API server: building an application's object graph, applying it in
dependency order, waiting for it to converge and tearing it down again.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use app::{AccessGrant, AppDescriptor, ConfigSecret, Exposure, GrantSubject, ReadinessProbe};
pub use endpoint::{service_host, DeployedEndpoint};
pub use error::{Error, Result};
pub use graph::{Object, ObjectGraph, ObjectKind, ObjectRef, Rank};
pub use tls::KeyBundle;

mod app;
pub mod clients;
pub mod constants;
mod endpoint;
mod error;
mod graph;
pub mod manager;
pub mod schema;
pub mod system;
mod tls;
