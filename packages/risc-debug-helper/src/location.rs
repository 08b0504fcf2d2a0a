use std::fmt;

use serde::{Deserialize, Serialize};

pub type DeviceId = u8;

/// A physical core on a physical device.
///
/// The coordinate translation service owns the meaning of these values; the engine only
/// compares them, projects the device id, and hands the NoC coordinates to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoreLocation {
    device_id: DeviceId,
    noc_x: u8,
    noc_y: u8,
}

impl CoreLocation {
    pub fn new(device_id: DeviceId, noc_x: u8, noc_y: u8) -> Self {
        Self {
            device_id,
            noc_x,
            noc_y,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// NoC coordinates in the form the transport addresses registers with.
    pub fn noc_xy(&self) -> (u8, u8) {
        (self.noc_x, self.noc_y)
    }
}

impl fmt::Display for CoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.device_id, self.noc_x, self.noc_y)
    }
}
