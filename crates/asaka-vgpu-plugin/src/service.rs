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
use std::time::Duration;

use asaka_vgpu_broker::{AllocationBroker, AllocationError, ContainerEnvs};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::inventory::InventorySource;
use crate::proto::device_plugin_server::DevicePlugin;
use crate::proto::{
    AllocateRequest, AllocateResponse, ContainerAllocateResponse, DevicePluginOptions, Empty,
    ListAndWatchResponse, PreStartContainerRequest, PreStartContainerResponse,
};
use crate::refresh::run_inventory_refresh;

/// The v1beta1 `DevicePlugin` service handed to the tonic server.
pub struct DevicePluginService {
    broker: Arc<AllocationBroker>,
    inventory: Arc<dyn InventorySource>,
    refresh_interval: Duration,
    stop: watch::Receiver<bool>,
}

impl DevicePluginService {
    pub fn new(
        broker: Arc<AllocationBroker>,
        inventory: Arc<dyn InventorySource>,
        refresh_interval: Duration,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            broker,
            inventory,
            refresh_interval,
            stop,
        }
    }
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<DevicePluginOptions>, Status> {
        Ok(Response::new(DevicePluginOptions::default()))
    }

    type ListAndWatchStream = ReceiverStream<Result<ListAndWatchResponse, Status>>;

    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListAndWatchStream>, Status> {
        info!("kubelet opened inventory stream");
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(run_inventory_refresh(
            self.inventory.clone(),
            self.refresh_interval,
            self.stop.clone(),
            tx,
        ));
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        let request = request.into_inner();
        let mut container_responses = Vec::with_capacity(request.container_requests.len());
        for container in request.container_requests {
            info!(devices = %container.devices_ids.join(","), "allocate request");
            let envs = if container.devices_ids.is_empty() {
                ContainerEnvs::new()
            } else {
                self.broker
                    .allocate_vgpu(&container.devices_ids)
                    .await
                    .map_err(|err| {
                        warn!(error = %err, "allocation failed; rejecting batch");
                        allocation_status(&err)
                    })?
            };
            container_responses.push(ContainerAllocateResponse {
                envs,
                ..Default::default()
            });
        }
        Ok(Response::new(AllocateResponse {
            container_responses,
        }))
    }

    async fn pre_start_container(
        &self,
        _request: Request<PreStartContainerRequest>,
    ) -> Result<Response<PreStartContainerResponse>, Status> {
        Ok(Response::new(PreStartContainerResponse {}))
    }
}

fn allocation_status(err: &AllocationError) -> Status {
    match err {
        AllocationError::InsufficientCapacity { .. } => Status::resource_exhausted(err.to_string()),
        AllocationError::ControllerRejected { .. } => Status::failed_precondition(err.to_string()),
        AllocationError::Controller(_) => Status::unavailable(err.to_string()),
        AllocationError::Decode(_) => Status::internal(err.to_string()),
    }
}
