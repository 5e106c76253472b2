//! ---
//! asaka_section: "05-networking-external-interfaces"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Client surface for the XaaS capacity controller."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
//! Request/response wrapper around the XaaS capacity controller REST API.
//!
//! The client enforces the status-code contract and hands raw bodies back to
//! callers; decoding is left to the broker and the inventory source.
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod payload;

pub use client::{CapacityController, ControllerClient, SERVED_PROTOCOL};
pub use error::{ControllerError, Result};
pub use payload::{
    CandidateServer, DeviceDescriptor, ErrorEnvelope, ExtraAttribute, ServedService,
    VGPU_CAPACITY_ATTRIBUTE,
};
