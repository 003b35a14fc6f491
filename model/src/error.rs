use snafu::Snafu;
use std::path::PathBuf;

/// The error type for building objects, generating key material and decoding declarations.
#[derive(Debug, Snafu)]
pub struct Error(OpaqueError);
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum OpaqueError {
    #[snafu(display("Unable to generate certificate for '{}': {}", host, source))]
    Certificate { host: String, source: rcgen::Error },

    #[snafu(display(
        "Unable to decode custom resource definition from '{}': {}",
        path.display(),
        source
    ))]
    CrdDecode {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("Custom resource definition in '{}' has no name", path.display()))]
    CrdNameMissing { path: PathBuf },

    #[snafu(display("Unable to read '{}': {}", path.display(), source))]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("'{}' is not a valid DNS name: {}", host, source))]
    InvalidHost { host: String, source: rcgen::Error },

    #[snafu(display("{} is not a usable node port", port))]
    InvalidNodePort { port: i32 },

    #[snafu(display("Unable to generate key pair: {}", source))]
    KeyGeneration { source: rcgen::Error },

    #[snafu(display("Service '{}' has no allocated node port", service))]
    MissingNodePort { service: String },

    #[snafu(display("Service '{}' declares no ports", service))]
    MissingServicePort { service: String },

    #[snafu(display("Namespace '{}' has no {}", namespace, what))]
    NamespaceIncomplete { namespace: String, what: String },

    #[snafu(display("Unable to build endpoint url '{}': {}", url, source))]
    Url {
        url: String,
        source: url::ParseError,
    },
}
