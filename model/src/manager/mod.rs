/*!

`DeployManager` drives an [`ObjectStore`](crate::clients::ObjectStore): it submits object graphs in
rank order, polls for convergence under bounded timeouts, and deletes what it created while
treating objects that are already gone as deleted.

!*/

pub use apply::{Applied, CrdRegistration};
pub use error::{Error, Result};
pub use wait::{describe_crd, describe_deployment, is_crd_established, is_deployment_ready};

mod apply;
mod delete;
mod error;
mod wait;

use crate::clients::ObjectStore;
use std::time::Duration;

/// How long to sleep between two reads while waiting for convergence, unless told otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Applies, waits for and deletes the objects of a session through `S`.
#[derive(Debug, Clone)]
pub struct DeployManager<S> {
    store: S,
    poll_interval: Duration,
}

impl<S: ObjectStore> DeployManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
