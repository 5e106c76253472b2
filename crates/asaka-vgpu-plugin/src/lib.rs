//! ---
//! asaka_section: "05-networking-external-interfaces"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Kubelet device plugin protocol surface."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
//! Kubelet-facing device plugin: serves the v1beta1 lifecycle API on a Unix
//! socket, streams the vGPU inventory, and registers with the kubelet.

pub mod error;
pub mod inventory;
pub mod refresh;
pub mod server;
pub mod service;
pub mod uds;

#[allow(missing_docs, clippy::all)]
pub mod proto {
    tonic::include_proto!("v1beta1");
}

pub use error::{PluginError, Result};
pub use inventory::{expand_inventory, ControllerInventory, InventorySource, HEALTHY};
pub use refresh::run_inventory_refresh;
pub use server::{PluginServer, PluginSettings, ServerState};
pub use service::DevicePluginService;
