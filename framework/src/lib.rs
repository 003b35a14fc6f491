/*!

Runs end-to-end test sessions for the OIDC proxy against a `kind` cluster. A [`Session`] owns a
namespace, deploys the mock issuer, the proxy's custom resource definitions and the proxy itself,
waits for each to converge, and removes everything again on teardown.

Settings are read from `E2E_`-prefixed environment variables, see [`Config`].

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

pub use apps::AppRole;
pub use config::Config;
pub use error::{Error, Result};
pub use session::{Session, SessionState};

pub mod apps;
pub mod cluster;
mod config;
mod error;
mod session;

use env_logger::Builder;
use log::LevelFilter;

/// Initialize logging for tests. `RUST_LOG` is honored when set; otherwise this workspace's
/// crates log at `info`. Calling this more than once is harmless.
pub fn init_logger() {
    // An error only means another test installed the logger first.
    let _ = match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        // RUST_LOG exists; env_logger will use it.
        Some(_) => Builder::from_default_env().is_test(true).try_init(),
        // RUST_LOG does not exist; use the default level for this workspace only.
        None => Builder::new()
            .is_test(true)
            .filter(Some(env!("CARGO_CRATE_NAME")), LevelFilter::Info)
            .filter(Some("e2e_model"), LevelFilter::Info)
            .try_init(),
    };
}
