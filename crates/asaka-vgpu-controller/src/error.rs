//! ---
//! asaka_section: "05-networking-external-interfaces"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Client surface for the XaaS capacity controller."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use thiserror::Error;

/// Result alias for controller calls.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Failures talking to the capacity controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The controller could not be reached.
    #[error("failed to reach capacity controller at {url}: {source}")]
    Transport {
        /// Request URL.
        url: String,
        /// Underlying HTTP failure.
        #[source]
        source: reqwest::Error,
    },
    /// The controller answered with a status code above 299.
    #[error("unexpected response code {status} from {url}")]
    UnexpectedStatus {
        /// Request URL.
        url: String,
        /// HTTP status code returned.
        status: u16,
    },
    /// The response body could not be read to completion.
    #[error("failed to read response body from {url}: {source}")]
    Body {
        /// Request URL.
        url: String,
        /// Underlying HTTP failure.
        #[source]
        source: reqwest::Error,
    },
    /// The HTTP client itself could not be constructed.
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ControllerError {
    /// Whether the failure happened before any response was received.
    pub fn is_transport(&self) -> bool {
        matches!(self, ControllerError::Transport { .. })
    }
}
