use crate::{ObjectKind, ObjectRef};
use snafu::Snafu;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for `DeployManager`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum Error {
    // The store error already names the call and the object.
    #[snafu(display("{}", source))]
    Create {
        object: ObjectRef,
        source: crate::clients::Error,
    },

    #[snafu(display("{}", source))]
    Delete {
        object: ObjectRef,
        source: crate::clients::Error,
    },

    #[snafu(display("{}", source))]
    Model { source: crate::Error },

    #[snafu(display("Unable to {}: {}", action, source))]
    Store {
        action: String,
        source: crate::clients::Error,
    },

    #[snafu(display(
        "Timed out after {:?} waiting for {}, last observed: {}",
        timeout,
        what,
        last_observed
    ))]
    Timeout {
        what: String,
        timeout: Duration,
        last_observed: String,
    },

    #[snafu(display("The store returned a {} for a {}", actual, expected))]
    UnexpectedKind {
        expected: ObjectKind,
        actual: ObjectKind,
    },
}
