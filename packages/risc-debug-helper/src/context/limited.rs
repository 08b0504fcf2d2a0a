use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::{ContextKind, Device, DeviceSource, ExecutionContext, Netlist};
use crate::error::CapabilityError;
use crate::firmware::Firmware;
use crate::location::{CoreLocation, DeviceId};

/// A session on bare devices. Firmware is whatever the user loaded during the session.
pub struct LimitedContext {
    devices: DeviceSource,
    loaded: Mutex<HashMap<(CoreLocation, u8), PathBuf>>,
}

impl LimitedContext {
    pub(crate) fn new(devices: DeviceSource) -> Self {
        Self {
            devices,
            loaded: Mutex::new(HashMap::new()),
        }
    }
}

impl ExecutionContext for LimitedContext {
    fn kind(&self) -> ContextKind {
        ContextKind::Limited
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
        Err(CapabilityError::LimitedFunctionality("netlist"))
    }

    fn firmware_image_for(
        &self,
        location: &CoreLocation,
        core_index: u8,
    ) -> Result<Option<PathBuf>, CapabilityError> {
        let loaded = self.loaded.lock().unwrap_or_else(|p| p.into_inner());
        Ok(loaded.get(&(*location, core_index)).cloned())
    }

    fn firmware(&self) -> Result<&Firmware, CapabilityError> {
        Err(CapabilityError::LimitedFunctionality("firmware symbols"))
    }

    fn epoch_symbol_address(&self) -> Result<u64, CapabilityError> {
        Err(CapabilityError::LimitedFunctionality("epoch symbol"))
    }

    fn ethernet_epoch_symbol_address(&self) -> Result<u64, CapabilityError> {
        Err(CapabilityError::LimitedFunctionality("ethernet epoch symbol"))
    }

    fn record_loaded(
        &self,
        location: &CoreLocation,
        core_index: u8,
        path: PathBuf,
    ) -> Result<(), CapabilityError> {
        log::info!("{location} core {core_index} runs '{}'", path.display());
        let mut loaded = self.loaded.lock().unwrap_or_else(|p| p.into_inner());
        loaded.insert((*location, core_index), path);
        Ok(())
    }
}
