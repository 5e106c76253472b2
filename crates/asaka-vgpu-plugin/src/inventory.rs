//! ---
//! asaka_section: "05-networking-external-interfaces"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Kubelet device plugin protocol surface."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::sync::Arc;

use asaka_vgpu_controller::{CapacityController, DeviceDescriptor, VGPU_CAPACITY_ATTRIBUTE};
use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::proto::Device;

/// Health reported for every advertised vGPU.
pub const HEALTHY: &str = "Healthy";

/// Producer of full inventory snapshots.
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn devices(&self) -> Vec<Device>;
}

/// Inventory backed by the capacity controller's device listing.
pub struct ControllerInventory {
    controller: Arc<dyn CapacityController>,
}

impl ControllerInventory {
    pub fn new(controller: Arc<dyn CapacityController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl InventorySource for ControllerInventory {
    async fn devices(&self) -> Vec<Device> {
        match self.controller.list_devices().await {
            Ok(body) => expand_inventory(&body),
            Err(err) => {
                error!(error = %err, "failed to fetch device inventory");
                Vec::new()
            }
        }
    }
}

/// Expand raw descriptors into one logical device per declared vGPU slot.
///
/// Descriptors that fail to decode, or carry a missing or unparseable `vgpu_num`,
/// contribute nothing. A body that is not a list yields an empty inventory.
pub fn expand_inventory(body: &str) -> Vec<Device> {
    let entries: Vec<serde_json::Value> = match serde_json::from_str(body) {
        Ok(entries) => entries,
        Err(err) => {
            error!(error = %err, "failed to decode device inventory");
            return Vec::new();
        }
    };

    let mut devices = Vec::new();
    for (position, entry) in entries.into_iter().enumerate() {
        let descriptor: DeviceDescriptor = match serde_json::from_value(entry) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                warn!(position, error = %err, "undecodable device descriptor; skipping");
                continue;
            }
        };
        let capacity = descriptor_capacity(&descriptor);
        devices.extend((0..capacity).map(|slot| {
            let id = format!("{}:{slot}", descriptor.id);
            debug!(vgpu_id = %id, "advertising vGPU");
            Device {
                id,
                health: HEALTHY.to_owned(),
            }
        }));
    }
    devices
}

fn descriptor_capacity(descriptor: &DeviceDescriptor) -> usize {
    let Some(raw) = descriptor.extra_attribute(VGPU_CAPACITY_ATTRIBUTE) else {
        warn!(device = %descriptor.id, "descriptor has no vgpu_num attribute; skipping");
        return 0;
    };
    match raw.trim().parse::<usize>() {
        Ok(capacity) => capacity,
        Err(err) => {
            warn!(device = %descriptor.id, value = %raw, error = %err, "invalid vgpu_num attribute; skipping");
            0
        }
    }
}
