//! ---
//! asaka_section: "02-allocation"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Reservation bookkeeping for controller-granted vGPU capacity."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use asaka_vgpu_controller::ControllerError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AllocationError>;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("capacity response is neither a candidate list nor an error envelope: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("capacity controller rejected the request: {message}")]
    ControllerRejected { message: String },
    #[error("not enough asaka vGPUs left to satisfy a request for {requested}; please wait")]
    InsufficientCapacity { requested: usize },
}

impl AllocationError {
    pub fn is_insufficient_capacity(&self) -> bool {
        matches!(self, AllocationError::InsufficientCapacity { .. })
    }
}
