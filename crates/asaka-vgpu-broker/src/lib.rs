//! ---
//! asaka_section: "02-allocation"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Reservation bookkeeping for controller-granted vGPU capacity."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
//! Allocation broker sitting between the kubelet-facing server and the
//! capacity controller.

mod broker;
mod error;
mod key;

pub use broker::{
    select_candidate, AllocationBroker, AllocationRecord, ContainerEnvs, ENV_ASAKA_CONTROLLER_IP,
    ENV_ASAKA_K8S, ENV_CONTROLLER_IP, ENV_DEV, ENV_XAAS_CONTROLLER,
};
pub use error::{AllocationError, Result};
pub use key::ReservationKey;
