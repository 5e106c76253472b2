//! ---
//! asaka_section: "05-networking-external-interfaces"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Kubelet device plugin protocol surface."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias for device plugin operations.
pub type Result<T> = std::result::Result<T, PluginError>;

/// Failures serving, dialing or registering the device plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Removing or binding a Unix socket failed.
    #[error("socket i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The gRPC channel to a Unix socket could not be established.
    #[error("grpc transport on {path}: {source}")]
    Transport {
        path: PathBuf,
        #[source]
        source: tonic::transport::Error,
    },
    /// A dial or registration call did not finish within its bound.
    #[error("timed out after {timeout:?} dialing {path}")]
    DialTimeout { path: PathBuf, timeout: Duration },
    /// The kubelet answered `Register` with an error status.
    #[error("kubelet rejected registration of {resource}: {status}")]
    Registration {
        resource: String,
        #[source]
        status: tonic::Status,
    },
    /// `start` was called on an instance that is already serving.
    #[error("device plugin server already started on {0}")]
    AlreadyStarted(PathBuf),
}
