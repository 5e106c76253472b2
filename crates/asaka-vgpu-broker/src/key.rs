//! ---
//! asaka_section: "02-allocation"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Reservation bookkeeping for controller-granted vGPU capacity."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::fmt;

use sha2::{Digest, Sha256};

/// Content hash of a requested device id set, independent of input order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReservationKey(String);

impl ReservationKey {
    pub fn from_device_ids<S: AsRef<str>>(device_ids: &[S]) -> Self {
        let mut sorted: Vec<&str> = device_ids.iter().map(AsRef::as_ref).collect();
        sorted.sort_unstable();

        let mut hasher = Sha256::new();
        for id in sorted {
            // NUL terminator keeps ["a,b"] and ["a", "b"] apart.
            hasher.update(id.as_bytes());
            hasher.update([0u8]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReservationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
