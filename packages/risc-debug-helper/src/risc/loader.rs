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

//! Loads firmware ELF sections into a RISC core.

use std::fs::File;
use std::path::Path;

use object::{Object, ObjectSection};

use crate::error::{DebugError, LoadError};
use crate::location::CoreLocation;
use crate::risc::debug::{RiscDebug, RiscTarget};
use crate::risc::memory::MemoryRegion;
use crate::risc::transport::RegisterTransport;

pub const SECTIONS_TO_LOAD: [&str; 4] = [".init", ".text", ".ldm_data", ".stack"];

const JAL_OPCODE: u32 = 0x6f;
const JAL_MAX_OFFSET: u32 = 0x0007_ffff;

/// NoC used for plain (non-debug) block transfers.
const LOADER_NOC_ID: u8 = 0;

pub struct RiscLoader<'a> {
    debug: RiscDebug<'a>,
    transport: &'a dyn RegisterTransport,
}

impl<'a> RiscLoader<'a> {
    pub fn new(location: CoreLocation, core_index: u8, transport: &'a dyn RegisterTransport) -> Self {
        let target = RiscTarget::new(location, LOADER_NOC_ID, core_index);
        Self {
            debug: RiscDebug::new(target, transport).with_verbose(crate::debug::is_verbose()),
            transport,
        }
    }

    pub fn debug(&self) -> &RiscDebug<'a> {
        &self.debug
    }

    /// `JAL x0, address`, placed at address 0, where BRISC starts executing.
    pub fn jump_to_address_instruction(address: u32) -> u32 {
        assert!(
            address < JAL_MAX_OFFSET,
            "firmware base exceeds JAL maximum offset"
        );
        // imm[20|10:1|11|19:12], bit 20 is always 0 here
        let bits_10_to_1 = (address & 0x7fe) << 20;
        let bit_11 = (address & 0x800) << 9;
        let bits_19_to_12 = address & 0xff000;
        bits_10_to_1 | bit_11 | bits_19_to_12 | JAL_OPCODE
    }

    pub fn write_block_through_debug(&self, address: u32, data: &[u8]) -> Result<(), DebugError> {
        self.debug.enable_debug()?;
        self.debug.ensure_halted(|dbg| {
            for (i, chunk) in data.chunks(4).enumerate() {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                dbg.write_memory(address + (i as u32) * 4, u32::from_le_bytes(word))?;
            }
            Ok(())
        })
    }

    pub fn read_block_through_debug(
        &self,
        address: u32,
        byte_count: usize,
    ) -> Result<Vec<u8>, DebugError> {
        self.debug.enable_debug()?;
        let mut data = self.debug.ensure_halted(|dbg| {
            let mut data = Vec::with_capacity(byte_count.next_multiple_of(4));
            for offset in (0..byte_count).step_by(4) {
                let word = dbg.read_memory(address + offset as u32)?;
                data.extend_from_slice(&word.to_le_bytes());
            }
            Ok(data)
        })?;
        data.truncate(byte_count);
        Ok(data)
    }

    /// Writes through the debug interface for the private window, through the NoC otherwise.
    pub fn write_block(&self, address: u32, data: &[u8]) -> Result<(), DebugError> {
        if crate::risc::memory::is_private_address(address as u64) {
            self.write_block_through_debug(address, data)
        } else {
            let location = self.debug.target().location;
            Ok(self
                .transport
                .write_block(&location, LOADER_NOC_ID, address, data)?)
        }
    }

    pub fn read_block(&self, address: u32, byte_count: usize) -> Result<Vec<u8>, DebugError> {
        if crate::risc::memory::is_private_address(address as u64) {
            self.read_block_through_debug(address, byte_count)
        } else {
            let location = self.debug.target().location;
            Ok(self
                .transport
                .read_block(&location, LOADER_NOC_ID, address, byte_count)?)
        }
    }

    /// Write the loadable sections of `elf_path` and verify them by reading back.
    /// Returns the address of `.init`, if the image has one.
    pub fn load_elf(&self, elf_path: &Path) -> Result<Option<u64>, DebugError> {
        let file = File::open(elf_path).map_err(|source| LoadError::Io {
            path: elf_path.to_path_buf(),
            source,
        })?;
        // SAFETY: the mapping is read-only and dropped before this function returns.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|source| LoadError::Io {
            path: elf_path.to_path_buf(),
            source,
        })?;
        let obj = object::File::parse(&*mmap).map_err(LoadError::from)?;

        let mut sections: Vec<(MemoryRegion, &[u8])> = Vec::new();
        for section in obj.sections() {
            let name = section.name().map_err(LoadError::from)?;
            if !SECTIONS_TO_LOAD.contains(&name) {
                continue;
            }
            let data = section.data().map_err(LoadError::from)?;
            if data.is_empty() {
                continue;
            }
            let region = MemoryRegion::new(
                name.to_string(),
                section.address(),
                data.len() as u64,
                section.align(),
            );
            if !region.is_word_aligned() {
                return Err(LoadError::UnalignedSection {
                    name: region.name,
                    address: region.start,
                }
                .into());
            }
            sections.push((region, data));
        }

        let mut init_address = None;
        for (region, data) in &sections {
            if region.name == ".init" {
                init_address = Some(region.start);
            }
            log::info!(
                "Writing section {} to address 0x{:08x}. Size: {} bytes",
                region.name,
                region.start,
                region.size
            );
            self.write_block(region.start as u32, data)?;
        }

        for (region, data) in &sections {
            let read_back = self.read_block(region.start as u32, data.len())?;
            if read_back.as_slice() != *data {
                log::error!(
                    "Error writing section {} to address 0x{:08x}.",
                    region.name,
                    region.start
                );
                continue;
            }
            log::info!(
                "Section {} loaded successfully to address 0x{:08x}. Size: {} bytes",
                region.name,
                region.start,
                region.size
            );
        }

        Ok(init_address)
    }
}
