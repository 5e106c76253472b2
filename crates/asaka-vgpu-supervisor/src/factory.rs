//! ---
//! asaka_section: "04-lifecycle"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Restart loop keeping the device plugin registered with the kubelet."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::sync::Arc;

use asaka_vgpu_broker::AllocationBroker;
use asaka_vgpu_plugin::{InventorySource, PluginError, PluginServer, PluginSettings};
use async_trait::async_trait;

use crate::supervisor::{PluginFactory, PluginLifecycle};

/// Builds [`PluginServer`]s that share one broker and inventory source.
pub struct PluginServerFactory {
    settings: PluginSettings,
    broker: Arc<AllocationBroker>,
    inventory: Arc<dyn InventorySource>,
}

impl PluginServerFactory {
    pub fn new(
        settings: PluginSettings,
        broker: Arc<AllocationBroker>,
        inventory: Arc<dyn InventorySource>,
    ) -> Self {
        Self {
            settings,
            broker,
            inventory,
        }
    }
}

impl PluginFactory for PluginServerFactory {
    type Plugin = PluginServer;

    fn create(&self) -> PluginServer {
        PluginServer::new(
            self.settings.clone(),
            self.broker.clone(),
            self.inventory.clone(),
        )
    }
}

#[async_trait]
impl PluginLifecycle for PluginServer {
    async fn serve(&mut self) -> Result<(), PluginError> {
        PluginServer::serve(self).await
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        PluginServer::stop(self).await
    }
}
