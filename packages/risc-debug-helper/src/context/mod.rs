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

//! What a debugging session can do, depending on what it was started with.
//!
//! A session with a netlist gets a [`FullContext`], a bare device gets a [`LimitedContext`]
//! and an architecture the engine cannot debug gets an [`UnsupportedContext`]. Callers hold a
//! `Box<dyn ExecutionContext>` and ask for capabilities; the unavailable ones fail with
//! [`CapabilityError::LimitedFunctionality`] or [`CapabilityError::Unsupported`].

mod full;
mod limited;
mod unsupported;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use serde::Serialize;

pub use full::FullContext;
pub use limited::LimitedContext;
pub use unsupported::UnsupportedContext;

use crate::config::SessionConfig;
use crate::error::{CapabilityError, TransportError};
use crate::firmware::{DwarfParser, Firmware, ImageParser};
use crate::location::{CoreLocation, DeviceId};

/// Architectures whose cores the engine knows how to debug.
pub const SUPPORTED_ARCHS: &[&str] = &["grayskull", "wormhole", "wormhole_b0", "blackhole"];

pub fn is_supported_arch(arch: &str) -> bool {
    SUPPORTED_ARCHS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(arch))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: DeviceId,
    pub arch: String,
}

/// Enumerates the devices attached to the host.
pub trait DeviceDiscovery: Send + Sync {
    fn device_ids(&self) -> Result<Vec<DeviceId>, TransportError>;
    fn device_arch(&self, device_id: DeviceId) -> Result<String, TransportError>;
}

/// Names a graph inside a netlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GraphHandle(pub String);

/// Description of the workload placed on the devices.
pub trait Netlist: Send + Sync {
    fn graph_owning(&self, location: &CoreLocation) -> Option<GraphHandle>;
    fn operation_name(&self, graph: &GraphHandle, location: &CoreLocation) -> Option<String>;
    fn firmware_path_for_operation(
        &self,
        graph: &GraphHandle,
        operation: &str,
        core_index: u8,
    ) -> Option<PathBuf>;
    fn device_ids(&self) -> Vec<DeviceId>;
    fn arch(&self) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Full,
    Limited,
    Unsupported,
}

pub trait ExecutionContext: Send + Sync {
    fn kind(&self) -> ContextKind;

    fn devices(&self) -> Result<&BTreeMap<DeviceId, Device>, CapabilityError>;

    fn device_ids(&self) -> Result<&BTreeSet<DeviceId>, CapabilityError>;

    fn arch(&self) -> Result<&str, CapabilityError>;

    fn netlist(&self) -> Result<Arc<dyn Netlist>, CapabilityError>;

    /// Firmware image running on `core_index` of `location`; `Ok(None)` when none is known.
    fn firmware_image_for(
        &self,
        location: &CoreLocation,
        core_index: u8,
    ) -> Result<Option<PathBuf>, CapabilityError>;

    fn firmware(&self) -> Result<&Firmware, CapabilityError>;

    fn epoch_symbol_address(&self) -> Result<u64, CapabilityError>;

    fn ethernet_epoch_symbol_address(&self) -> Result<u64, CapabilityError>;

    /// Remember that `path` was loaded onto `core_index` of `location`.
    fn record_loaded(
        &self,
        _location: &CoreLocation,
        _core_index: u8,
        _path: PathBuf,
    ) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unsupported("recording loaded firmware"))
    }
}

/// Pick the context variant for what the session was started with.
pub fn load_context(
    discovery: Option<Arc<dyn DeviceDiscovery>>,
    netlist: Option<Arc<dyn Netlist>>,
    config: SessionConfig,
) -> Box<dyn ExecutionContext> {
    load_context_with(discovery, netlist, config, Arc::new(DwarfParser))
}

/// [`load_context`] with the parser a full context reads its firmware images with.
pub fn load_context_with(
    discovery: Option<Arc<dyn DeviceDiscovery>>,
    netlist: Option<Arc<dyn Netlist>>,
    config: SessionConfig,
    parser: Arc<dyn ImageParser>,
) -> Box<dyn ExecutionContext> {
    let devices = DeviceSource::new(discovery, netlist.clone());
    match devices.arch() {
        Ok(arch) if !is_supported_arch(arch) => {
            log::warn!("Architecture '{arch}' is not supported, debugging is disabled");
            return Box::new(UnsupportedContext::new(devices));
        }
        Err(e) => {
            log::warn!("No devices found ({e}), debugging is disabled");
            return Box::new(UnsupportedContext::new(devices));
        }
        Ok(_) => {}
    }
    match netlist {
        Some(netlist) => Box::new(FullContext::new(devices, netlist, config, parser)),
        None => {
            log::info!("No netlist given, running with limited functionality");
            Box::new(LimitedContext::new(devices))
        }
    }
}

/// Lazily discovered device facts, shared by every context variant.
///
/// Hardware discovery is asked first; the netlist is the fallback.
pub(crate) struct DeviceSource {
    discovery: Option<Arc<dyn DeviceDiscovery>>,
    netlist: Option<Arc<dyn Netlist>>,
    devices: OnceLock<Result<BTreeMap<DeviceId, Device>, CapabilityError>>,
    device_ids: OnceLock<Result<BTreeSet<DeviceId>, CapabilityError>>,
    arch: OnceLock<Result<String, CapabilityError>>,
}

impl DeviceSource {
    pub(crate) fn new(
        discovery: Option<Arc<dyn DeviceDiscovery>>,
        netlist: Option<Arc<dyn Netlist>>,
    ) -> Self {
        Self {
            discovery,
            netlist,
            devices: OnceLock::new(),
            device_ids: OnceLock::new(),
            arch: OnceLock::new(),
        }
    }

    pub(crate) fn device_ids(&self) -> Result<&BTreeSet<DeviceId>, CapabilityError> {
        self.device_ids
            .get_or_init(|| self.discover_ids())
            .as_ref()
            .map_err(Clone::clone)
    }

    pub(crate) fn arch(&self) -> Result<&str, CapabilityError> {
        self.arch
            .get_or_init(|| {
                // the netlist can name the architecture even when no device answers
                let first = self
                    .device_ids()
                    .ok()
                    .and_then(|ids| ids.iter().next().copied());
                if let (Some(discovery), Some(id)) = (&self.discovery, first) {
                    match discovery.device_arch(id) {
                        Ok(arch) => return Ok(arch),
                        Err(e) => log::debug!("Device {id} did not report its architecture: {e}"),
                    }
                }
                self.netlist
                    .as_ref()
                    .and_then(|netlist| netlist.arch())
                    .ok_or_else(|| CapabilityError::Discovery("architecture unknown".into()))
            })
            .as_deref()
            .map_err(Clone::clone)
    }

    pub(crate) fn devices(&self) -> Result<&BTreeMap<DeviceId, Device>, CapabilityError> {
        self.devices
            .get_or_init(|| {
                let fallback_arch = self.arch()?.to_string();
                let mut devices = BTreeMap::new();
                for &id in self.device_ids()? {
                    let arch = self
                        .discovery
                        .as_ref()
                        .and_then(|discovery| discovery.device_arch(id).ok())
                        .unwrap_or_else(|| fallback_arch.clone());
                    devices.insert(id, Device { id, arch });
                }
                Ok(devices)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    fn discover_ids(&self) -> Result<BTreeSet<DeviceId>, CapabilityError> {
        let mut failure = None;
        if let Some(discovery) = &self.discovery {
            match discovery.device_ids() {
                Ok(ids) if !ids.is_empty() => return Ok(ids.into_iter().collect()),
                Ok(_) => log::debug!("Device discovery found no devices"),
                Err(e) => failure = Some(e.to_string()),
            }
        }
        if let Some(netlist) = &self.netlist {
            let ids = netlist.device_ids();
            if !ids.is_empty() {
                return Ok(ids.into_iter().collect());
            }
        }
        Err(CapabilityError::Discovery(
            failure.unwrap_or_else(|| "no devices found".to_string()),
        ))
    }
}
