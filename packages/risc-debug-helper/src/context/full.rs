// Copyright (c) 2026 MCU-Debug Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use super::{ContextKind, Device, DeviceSource, ExecutionContext, Netlist};
use crate::config::{EPOCH_INFO_PTR, ETH_EPOCH_INFO_PTR, SessionConfig};
use crate::error::CapabilityError;
use crate::firmware::{Firmware, ImageParser};
use crate::location::{CoreLocation, DeviceId};

/// Image holding the epoch pointers.
pub const EPOCH_IMAGE: &str = "brisc";

/// A session with a netlist: firmware symbols and per-operation images are available.
pub struct FullContext {
    devices: DeviceSource,
    netlist: Arc<dyn Netlist>,
    config: SessionConfig,
    parser: Arc<dyn ImageParser>,
    firmware: OnceLock<Result<Firmware, CapabilityError>>,
    images: Mutex<HashMap<(CoreLocation, u8), Option<PathBuf>>>,
}

impl FullContext {
    pub(crate) fn new(
        devices: DeviceSource,
        netlist: Arc<dyn Netlist>,
        config: SessionConfig,
        parser: Arc<dyn ImageParser>,
    ) -> Self {
        Self {
            devices,
            netlist,
            config,
            parser,
            firmware: OnceLock::new(),
            images: Mutex::new(HashMap::new()),
        }
    }

    fn load_firmware(&self) -> Result<Firmware, CapabilityError> {
        let arch = self.devices.arch()?;
        let extra_vars = self.config.extra_vars_for(arch);
        Firmware::load_with(self.parser.as_ref(), &self.config.firmware, Some(&extra_vars))
            .map_err(|e| CapabilityError::FirmwareLoad(e.to_string()))
    }

    fn symbol_address(&self, name: &str) -> Result<u64, CapabilityError> {
        let path = format!("{EPOCH_IMAGE}.{name}");
        let (address, _) = self.firmware()?.parse_addr_size(&path, None)?;
        Ok(address)
    }

    fn lookup_image(&self, location: &CoreLocation, core_index: u8) -> Option<PathBuf> {
        let graph = self.netlist.graph_owning(location)?;
        let operation = self.netlist.operation_name(&graph, location)?;
        self.netlist
            .firmware_path_for_operation(&graph, &operation, core_index)
    }
}

impl ExecutionContext for FullContext {
    fn kind(&self) -> ContextKind {
        ContextKind::Full
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
        Ok(self.netlist.clone())
    }

    fn firmware_image_for(
        &self,
        location: &CoreLocation,
        core_index: u8,
    ) -> Result<Option<PathBuf>, CapabilityError> {
        let mut images = self.images.lock().unwrap_or_else(|p| p.into_inner());
        let path = images
            .entry((*location, core_index))
            .or_insert_with(|| self.lookup_image(location, core_index));
        Ok(path.clone())
    }

    fn firmware(&self) -> Result<&Firmware, CapabilityError> {
        self.firmware
            .get_or_init(|| self.load_firmware())
            .as_ref()
            .map_err(Clone::clone)
    }

    fn epoch_symbol_address(&self) -> Result<u64, CapabilityError> {
        self.symbol_address(EPOCH_INFO_PTR)
    }

    fn ethernet_epoch_symbol_address(&self) -> Result<u64, CapabilityError> {
        self.symbol_address(ETH_EPOCH_INFO_PTR)
    }
}
