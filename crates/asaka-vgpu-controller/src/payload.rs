//! ---
//! asaka_section: "05-networking-external-interfaces"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Client surface for the XaaS capacity controller."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
//! JSON payloads exchanged with the capacity controller.

use serde::{Deserialize, Deserializer, Serialize};

/// Extra attribute key carrying a descriptor's vGPU capacity.
pub const VGPU_CAPACITY_ATTRIBUTE: &str = "vgpu_num";

/// Physical device descriptor as listed by `GET /device`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct DeviceDescriptor {
    #[serde(rename = "device_id", deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "device_index", deserialize_with = "null_as_default")]
    pub index: String,
    #[serde(rename = "device_name", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "device_platform_vendor", deserialize_with = "null_as_default")]
    pub platform_vendor: String,
    #[serde(rename = "device_platform_name", deserialize_with = "null_as_default")]
    pub platform_name: String,
    #[serde(rename = "device_vendor", deserialize_with = "null_as_default")]
    pub vendor: String,
    #[serde(rename = "device_type", deserialize_with = "null_as_default")]
    pub device_type: String,
    #[serde(rename = "beloned_user_id", deserialize_with = "null_as_default")]
    pub owner: String,
    #[serde(rename = "device_ip", deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(rename = "device_port", deserialize_with = "null_as_default")]
    pub port: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub served_protocol: String,
    #[serde(rename = "extra_attributes", deserialize_with = "null_as_default")]
    pub extra_attributes: Vec<ExtraAttribute>,
}

impl DeviceDescriptor {
    /// Value of the first extra attribute named `key`.
    pub fn extra_attribute(&self, key: &str) -> Option<&str> {
        self.extra_attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| attr.value.as_str())
    }
}

/// Key/value pair attached to a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ExtraAttribute {
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub value: String,
}

/// Server offered by the controller in answer to a capacity request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct CandidateServer {
    #[serde(deserialize_with = "null_as_default")]
    pub service_ip: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service_port: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub services: Vec<ServedService>,
    #[serde(deserialize_with = "null_as_default")]
    pub allocation_id: String,
}

/// A device slice served by a [`CandidateServer`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct ServedService {
    #[serde(deserialize_with = "null_as_default")]
    pub device_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub device_quota: String,
    #[serde(deserialize_with = "null_as_default")]
    pub device: DeviceDescriptor,
    #[serde(deserialize_with = "null_as_default")]
    pub served_protocol: String,
    #[serde(rename = "service_occupied", deserialize_with = "null_as_default")]
    pub occupied: bool,
}

/// Structured error returned by the controller instead of a candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Controller supplied message.
    #[serde(rename = "Error")]
    pub message: String,
}

// `null` decodes as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    })
}
