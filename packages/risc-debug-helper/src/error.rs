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

//! Error types shared by the engine, the symbol resolver and the execution context.

use std::path::PathBuf;

use crate::location::CoreLocation;

/// Failure reported by a register/memory transport (live device, remote server or replay cache).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error talking to the device")]
    Io(#[from] std::io::Error),
    #[error("no device with id {0}")]
    UnknownDevice(u8),
    #[error("address 0x{address:08x} is not accessible at {location}")]
    Inaccessible { location: CoreLocation, address: u64 },
    #[error("transport failure: {0}")]
    Other(String),
}

/// Failure of a debug protocol operation on a single RISC core.
#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{core} is not halted")]
    NotHalted { core: String },
    #[error("{core} is in reset")]
    InReset { core: String },
    #[error("failed to halt {core}")]
    HaltFailed { core: String },
    #[error("failed to resume {core}")]
    ContinueFailed { core: String },
    /// Only produced in strict read mode; otherwise the stale value is logged and returned.
    #[error("debug read of register {register} never became valid (last value 0x{value:08x})")]
    StaleRead { register: u32, value: u32 },
    #[error("unknown register '{0}'")]
    UnknownRegister(String),
    #[error("unknown RISC core '{0}'")]
    UnknownCore(String),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Failure to resolve a name or access path. Never fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol not found: no firmware image named '{0}'")]
    UnknownImage(String),
    #[error("symbol not found: {0}")]
    NotFound(String),
    #[error("{0} is not a pointer")]
    NotAPointer(String),
    #[error("{0} is not a pointer or an array")]
    NotIndexable(String),
    #[error("array index {index} is out of bounds (dimension {bound})")]
    IndexOutOfBounds { index: u64, bound: u64 },
    #[error("address of {0} does not fit in 64 bits")]
    AddressOverflow(String),
    #[error("cannot access {0} as a single value")]
    NotSingleValue(String),
    #[error("malformed access path '{0}'")]
    MalformedPath(String),
    #[error("{0} has no address in memory")]
    NoAddress(String),
    #[error("type of {0} has no known size")]
    UnknownSize(String),
    #[error("reading {0} requires a memory reader")]
    MemoryReaderRequired(String),
    #[error("memory read at 0x{address:08x} failed: {reason}")]
    ReadFailed { address: u64, reason: String },
}

/// Failure to load a firmware image. Fatal to `Firmware::load`.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse object file")]
    Object(#[from] object::Error),
    #[error("cannot parse DWARF")]
    Dwarf(#[from] gimli::Error),
    #[error("{0} has no DWARF info; the firmware must be compiled with -g")]
    NoDebugInfo(PathBuf),
    #[error("variable '{offset}' not found in image '{prefix}'; cannot add '{name}'")]
    MissingOffsetSymbol {
        prefix: String,
        name: String,
        offset: String,
    },
    #[error("'{offset}' in image '{prefix}' is negative ({value}); cannot add '{name}'")]
    NegativeOffset {
        prefix: String,
        name: String,
        offset: String,
        value: i64,
    },
    #[error("type '{type_name}' not found in image '{prefix}'; cannot add '{name}'")]
    MissingType {
        prefix: String,
        name: String,
        type_name: String,
    },
    #[error("invalid session configuration")]
    Config(#[from] serde_json::Error),
    #[error("section {name} at 0x{address:08x} is not 32-bit aligned")]
    UnalignedSection { name: String, address: u64 },
}

/// A capability requested from an execution context that cannot provide it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("{0} is not available: running with limited functionality")]
    LimitedFunctionality(&'static str),
    #[error("{0} is not available for this target")]
    Unsupported(&'static str),
    #[error("device discovery failed: {0}")]
    Discovery(String),
    #[error("firmware load failed: {0}")]
    FirmwareLoad(String),
    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

impl CapabilityError {
    /// True for the "this session cannot provide it" family, as opposed to lookup failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            CapabilityError::LimitedFunctionality(_) | CapabilityError::Unsupported(_)
        )
    }
}
