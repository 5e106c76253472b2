//! ---
//! asaka_section: "05-networking-external-interfaces"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Kubelet device plugin protocol surface."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
//! gRPC channels over Unix domain sockets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use crate::error::{PluginError, Result};

// The authority is ignored; every connection goes to the socket path.
const PLACEHOLDER_URI: &str = "http://[::]:50051";

/// Connect to the gRPC server behind `path`, failing after `timeout`.
pub async fn dial(path: &Path, timeout: Duration) -> Result<Channel> {
    let socket: PathBuf = path.to_path_buf();
    let endpoint = Endpoint::try_from(PLACEHOLDER_URI)
        .map_err(|source| PluginError::Transport {
            path: socket.clone(),
            source,
        })?
        .connect_timeout(timeout);

    let target = socket.clone();
    let connect = endpoint.connect_with_connector(service_fn(move |_: Uri| {
        UnixStream::connect(target.clone())
    }));

    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(channel)) => Ok(channel),
        Ok(Err(source)) => Err(PluginError::Transport {
            path: socket,
            source,
        }),
        Err(_) => Err(PluginError::DialTimeout {
            path: socket,
            timeout,
        }),
    }
}
