use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use super::{ContextKind, Device, DeviceSource, ExecutionContext, Netlist};
use crate::error::CapabilityError;
use crate::firmware::Firmware;
use crate::location::{CoreLocation, DeviceId};

/// Devices are listed, nothing else is offered.
pub struct UnsupportedContext {
    devices: DeviceSource,
}

impl UnsupportedContext {
    pub(crate) fn new(devices: DeviceSource) -> Self {
        Self { devices }
    }
}

impl ExecutionContext for UnsupportedContext {
    fn kind(&self) -> ContextKind {
        ContextKind::Unsupported
    }

    fn devices(&self) -> Result<&BTreeMap<DeviceId, Device>, CapabilityError> {
        self.devices.devices()
    }

    fn device_ids(&self) -> Result<&BTreeSet<DeviceId>, CapabilityError> {
        self.devices.device_ids()
    }

    fn arch(&self) -> Result<&str, CapabilityError> {
        self.devices.arch()
    }

    fn netlist(&self) -> Result<Arc<dyn Netlist>, CapabilityError> {
        Err(CapabilityError::Unsupported("netlist"))
    }

    fn firmware_image_for(
        &self,
        _location: &CoreLocation,
        _core_index: u8,
    ) -> Result<Option<PathBuf>, CapabilityError> {
        Err(CapabilityError::Unsupported("firmware images"))
    }

    fn firmware(&self) -> Result<&Firmware, CapabilityError> {
        Err(CapabilityError::Unsupported("firmware symbols"))
    }

    fn epoch_symbol_address(&self) -> Result<u64, CapabilityError> {
        Err(CapabilityError::Unsupported("epoch symbol"))
    }

    fn ethernet_epoch_symbol_address(&self) -> Result<u64, CapabilityError> {
        Err(CapabilityError::Unsupported("ethernet epoch symbol"))
    }
}
