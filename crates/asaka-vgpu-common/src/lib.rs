//! ---
//! asaka_section: "01-core-functionality"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Shared primitives and utilities for the device plugin runtime."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
//! Shared primitives for the Asaka vGPU device plugin workspace.
//! This crate exposes configuration validation, logging bootstrap, and the
//! fixed names the plugin advertises to the kubelet.

pub mod config;
pub mod logging;

pub use config::{
    ConfigError, PluginConfig, DEFAULT_DIAL_TIMEOUT, DEFAULT_HTTP_TIMEOUT, DEFAULT_PLUGIN_DIR,
    DEFAULT_RETRY_INTERVAL, DEVICE_PLUGIN_VERSION, INVENTORY_REFRESH_INTERVAL,
    KUBELET_SOCKET_NAME, PLUGIN_SOCKET_NAME, RESOURCE_NAME,
};
pub use logging::{init_tracing, LogFormat, LoggingConfig};
