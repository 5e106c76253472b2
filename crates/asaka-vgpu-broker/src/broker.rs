//! ---
//! asaka_section: "02-allocation"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Reservation bookkeeping for controller-granted vGPU capacity."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use asaka_vgpu_controller::{CandidateServer, CapacityController, ErrorEnvelope};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AllocationError, Result};
use crate::key::ReservationKey;

/// Marks the container as scheduled through the device plugin; always `1`.
pub const ENV_ASAKA_K8S: &str = "ASAKA_K8S";
/// Capacity controller address.
pub const ENV_XAAS_CONTROLLER: &str = "XaaS-Controller";
/// Capacity controller address.
pub const ENV_CONTROLLER_IP: &str = "CONTROLLER_IP";
/// Capacity controller address.
pub const ENV_ASAKA_CONTROLLER_IP: &str = "ASAKA_CONTROLLER_IP";
/// Allocation detail followed by `;ALLOCATION_ID=<id>`.
pub const ENV_DEV: &str = "DEV";

/// Environment injected into an allocated container.
pub type ContainerEnvs = HashMap<String, String>;

/// A controller-granted reservation remembered until release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    /// Controller-issued reservation token.
    pub allocation_id: String,
    /// Echoed back verbatim on release.
    pub allocation_detail: String,
}

/// Owns the reservation map and every allocate/release exchange with the controller.
pub struct AllocationBroker {
    controller: Arc<dyn CapacityController>,
    reservations: Mutex<HashMap<ReservationKey, AllocationRecord>>,
}

impl AllocationBroker {
    /// Broker with an empty reservation map.
    pub fn new(controller: Arc<dyn CapacityController>) -> Self {
        Self {
            controller,
            reservations: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve capacity for `device_ids` and build the container environment.
    ///
    /// An empty request succeeds with an empty environment and reserves nothing.
    pub async fn allocate_vgpu(&self, device_ids: &[String]) -> Result<ContainerEnvs> {
        let requested = device_ids.len();
        if requested == 0 {
            return Ok(ContainerEnvs::new());
        }
        info!(requested, "requesting vGPUs from capacity controller");

        let body = self.controller.request_capacity(requested).await?;
        let candidate = select_candidate(&body, requested).map_err(|err| {
            info!(requested, error = %err, "capacity request not satisfied");
            err
        })?;

        let mut envs = self.base_envs();
        let allocation_id = candidate.allocation_id;
        if !allocation_id.is_empty() {
            info!(%allocation_id, service = %candidate.service_name, "capacity granted");
            let detail = match self.controller.allocation_detail(&allocation_id).await {
                Ok(detail) => detail,
                Err(err) => {
                    warn!(%allocation_id, error = %err, "query allocation detail failed");
                    String::new()
                }
            };
            envs.insert(
                ENV_DEV.to_owned(),
                format!("{detail};ALLOCATION_ID={allocation_id}"),
            );

            if let Err(err) = self.controller.confirm_allocation(&allocation_id).await {
                warn!(%allocation_id, error = %err, "confirm allocation failed");
            }

            let key = ReservationKey::from_device_ids(device_ids);
            let mut reservations = self.reservations.lock().await;
            reservations
                .entry(key)
                .or_insert_with(|| AllocationRecord {
                    allocation_id,
                    allocation_detail: detail,
                });
        }

        debug!(?envs, "container environment prepared");
        Ok(envs)
    }

    /// Release the reservation recorded for `device_ids`, if any.
    ///
    /// Unknown keys are a no-op. The record leaves the map before the controller
    /// call so concurrent allocations are not blocked on it; a failed release puts
    /// it back for a later retry.
    pub async fn release_vgpu(&self, device_ids: &[String]) -> Result<()> {
        let key = ReservationKey::from_device_ids(device_ids);
        let Some(record) = self.reservations.lock().await.remove(&key) else {
            debug!(%key, "no reservation recorded; nothing to release");
            return Ok(());
        };

        info!(
            allocation_id = %record.allocation_id,
            detail = %record.allocation_detail,
            "releasing reservation"
        );
        if let Err(err) = self
            .controller
            .release_allocation(&record.allocation_id, &record.allocation_detail)
            .await
        {
            warn!(allocation_id = %record.allocation_id, error = %err, "release failed; keeping reservation");
            self.reservations.lock().await.entry(key).or_insert(record);
            return Err(err.into());
        }
        Ok(())
    }

    /// Recorded reservation for a device id set.
    pub async fn reservation(&self, device_ids: &[String]) -> Option<AllocationRecord> {
        let key = ReservationKey::from_device_ids(device_ids);
        self.reservations.lock().await.get(&key).cloned()
    }

    /// Number of reservations currently recorded.
    pub async fn reservation_count(&self) -> usize {
        self.reservations.lock().await.len()
    }

    fn base_envs(&self) -> ContainerEnvs {
        let address = self.controller.address().to_owned();
        ContainerEnvs::from([
            (ENV_ASAKA_K8S.to_owned(), "1".to_owned()),
            (ENV_XAAS_CONTROLLER.to_owned(), address.clone()),
            (ENV_CONTROLLER_IP.to_owned(), address.clone()),
            (ENV_ASAKA_CONTROLLER_IP.to_owned(), address),
        ])
    }
}

/// Classify a capacity response body and pick the first candidate.
pub fn select_candidate(body: &str, requested: usize) -> Result<CandidateServer> {
    let body = body.trim();
    if body == "null" {
        return Err(AllocationError::InsufficientCapacity { requested });
    }
    match serde_json::from_str::<Vec<CandidateServer>>(body) {
        Ok(candidates) => candidates
            .into_iter()
            .next()
            .ok_or(AllocationError::InsufficientCapacity { requested }),
        Err(list_err) => match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => Err(AllocationError::ControllerRejected {
                message: envelope.message,
            }),
            Err(_) => Err(AllocationError::Decode(list_err)),
        },
    }
}
