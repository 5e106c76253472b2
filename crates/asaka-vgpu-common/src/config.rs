//! ---
//! asaka_section: "01-core-functionality"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Shared primitives and utilities for the device plugin runtime."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::logging::LoggingConfig;

/// Extended resource name advertised to the kubelet.
pub const RESOURCE_NAME: &str = "asaka/vgpu";
/// Device plugin API version sent on registration.
pub const DEVICE_PLUGIN_VERSION: &str = "v1beta1";
/// File name of the plugin's own gRPC socket inside the plugin directory.
pub const PLUGIN_SOCKET_NAME: &str = "asaka-vgpu.sock";
/// File name of the kubelet registration socket inside the plugin directory.
pub const KUBELET_SOCKET_NAME: &str = "kubelet.sock";
pub const DEFAULT_PLUGIN_DIR: &str = "/var/lib/kubelet/device-plugins/";

pub const INVENTORY_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration problems that abort startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("capacity controller address is not configured (set XAAS_CONTROLLER_URI)")]
    MissingControllerAddress,
    #[error("capacity controller address '{0}' must be host[:port] without scheme or path")]
    InvalidControllerAddress(String),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("resource name must not be empty")]
    EmptyResourceName,
}

/// Validated runtime configuration for the device plugin daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub controller_address: String,
    pub plugin_dir: PathBuf,
    pub resource_name: String,
    pub http_timeout: Duration,
    pub dial_timeout: Duration,
    pub retry_interval: Duration,
    pub refresh_interval: Duration,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PluginConfig {
    /// Build a configuration with default paths and timings for the given controller.
    pub fn new(controller_address: impl Into<String>) -> Self {
        Self {
            controller_address: normalise_address(&controller_address.into()),
            plugin_dir: PathBuf::from(DEFAULT_PLUGIN_DIR),
            resource_name: RESOURCE_NAME.to_owned(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            refresh_interval: INVENTORY_REFRESH_INTERVAL,
            logging: LoggingConfig::default(),
        }
    }

    /// Resolve configuration from an optional controller address, failing when absent.
    pub fn from_controller_address(address: Option<&str>) -> Result<Self, ConfigError> {
        let address = address
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingControllerAddress)?;
        let config = Self::new(address);
        config.validate()?;
        Ok(config)
    }

    pub fn with_plugin_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.plugin_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Path of the socket this plugin serves on.
    pub fn plugin_socket(&self) -> PathBuf {
        self.plugin_dir.join(PLUGIN_SOCKET_NAME)
    }

    /// Path of the kubelet registration socket.
    pub fn kubelet_socket(&self) -> PathBuf {
        self.plugin_dir.join(KUBELET_SOCKET_NAME)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let address = self.controller_address.trim();
        if address.is_empty() {
            return Err(ConfigError::MissingControllerAddress);
        }
        if address.contains("://") || address.contains('/') || address.contains(char::is_whitespace)
        {
            return Err(ConfigError::InvalidControllerAddress(address.to_owned()));
        }
        if self.resource_name.trim().is_empty() {
            return Err(ConfigError::EmptyResourceName);
        }
        for (name, value) in [
            ("http timeout", self.http_timeout),
            ("dial timeout", self.dial_timeout),
            ("retry interval", self.retry_interval),
            ("refresh interval", self.refresh_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        debug!(controller = %address, plugin_dir = %self.plugin_dir.display(), "configuration validated");
        Ok(())
    }
}

fn normalise_address(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}
