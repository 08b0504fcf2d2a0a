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

//! Software model of the RISC debug register block.
//!
//! Behaves like a tile's `RISC_DBG_*` registers closely enough to drive [`RiscDebug`]
//! without hardware, and records every physical register write so protocol
//! sequences can be checked. Plain addresses outside the debug registers are
//! backed by a sparse word-addressed memory shared by the cores of a tile.
//!
//! [`RiscDebug`]: crate::risc::debug::RiscDebug

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::TransportError;
use crate::location::CoreLocation;
use crate::risc::debug::RISC_CORE_COUNT;
use crate::risc::registers::*;
use crate::risc::transport::RegisterTransport;

const DEBUG_REGISTER_COUNT: usize = REG_WATCHPOINT_BASE as usize + WATCHPOINT_COUNT;
const CNTL0_WRITE_FLAG: u32 = 0x0001_0000;
const CNTL0_REGISTER_MASK: u32 = 0xFFFF;

/// One physical register write as seen by the simulated tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    pub location: CoreLocation,
    pub address: u32,
    pub value: u32,
}

struct SimCore {
    debug_regs: [u32; DEBUG_REGISTER_COUNT],
    gprs: [u32; PC_REGISTER_INDEX as usize + 1],
    debug_mode: bool,
    paused: bool,
    pc_watchpoint_hit: bool,
    memory_watchpoint_hit: bool,
}

impl Default for SimCore {
    fn default() -> Self {
        Self {
            debug_regs: [0; DEBUG_REGISTER_COUNT],
            gprs: [0; PC_REGISTER_INDEX as usize + 1],
            debug_mode: false,
            paused: false,
            pc_watchpoint_hit: false,
            memory_watchpoint_hit: false,
        }
    }
}

impl SimCore {
    fn status(&self) -> u32 {
        let mut status = 0;
        if self.paused {
            status |= status::PAUSED;
        }
        if self.pc_watchpoint_hit {
            status |= status::PC_WATCHPOINT_HIT;
        }
        if self.memory_watchpoint_hit {
            status |= status::MEMORY_WATCHPOINT_HIT;
        }
        status
    }

    fn watchpoint_matches(&self, address: u32, kinds: &[WatchpointKind]) -> bool {
        let settings = self.debug_regs[DebugRegister::WatchpointSettings.addr() as usize];
        (0..WATCHPOINT_COUNT).any(|slot| {
            let state = WatchpointState::from_settings(settings, slot);
            state.enabled
                && kinds.contains(&state.kind)
                && self.debug_regs[REG_WATCHPOINT_BASE as usize + slot] == address
        })
    }
}

#[derive(Default)]
struct SimTile {
    cntl0: u32,
    cntl1: u32,
    status0: u32,
    status1: u32,
    soft_reset: u32,
    cores: [SimCore; RISC_CORE_COUNT as usize],
    memory: HashMap<u32, u32>,
}

impl SimTile {
    fn read_word(&self, addr: u32) -> u32 {
        self.memory.get(&(addr & !3)).copied().unwrap_or(0)
    }

    fn execute(&mut self, core_index: usize, value: u32) {
        if value & command::DEBUG_MODE == 0 {
            return;
        }
        let action = value & !command::DEBUG_MODE;
        let core = &mut self.cores[core_index];
        core.debug_mode = true;
        let arg0 = core.debug_regs[DebugRegister::CommandArg0.addr() as usize];
        let arg1 = core.debug_regs[DebugRegister::CommandArg1.addr() as usize];
        match action {
            command::PAUSE => core.paused = true,
            command::CONTINUE => {
                core.paused = false;
                core.pc_watchpoint_hit = false;
                core.memory_watchpoint_hit = false;
            }
            command::STEP => {
                let pc = core.gprs[PC_REGISTER_INDEX as usize].wrapping_add(4);
                core.gprs[PC_REGISTER_INDEX as usize] = pc;
                core.pc_watchpoint_hit =
                    core.watchpoint_matches(pc, &[WatchpointKind::Breakpoint]);
            }
            command::READ_REGISTER => {
                let value = core.gprs.get(arg0 as usize).copied().unwrap_or(0);
                core.debug_regs[DebugRegister::CommandReturnValue.addr() as usize] = value;
            }
            command::WRITE_REGISTER => {
                if let Some(reg) = core.gprs.get_mut(arg0 as usize) {
                    *reg = arg1;
                }
            }
            command::READ_MEMORY => {
                core.memory_watchpoint_hit |=
                    core.watchpoint_matches(arg0, &[WatchpointKind::Read, WatchpointKind::Access]);
                let value = self.read_word(arg0);
                self.cores[core_index].debug_regs
                    [DebugRegister::CommandReturnValue.addr() as usize] = value;
            }
            command::WRITE_MEMORY => {
                core.memory_watchpoint_hit |=
                    core.watchpoint_matches(arg0, &[WatchpointKind::Write, WatchpointKind::Access]);
                self.memory.insert(arg0 & !3, arg1);
            }
            _ => {}
        }
    }

    fn trigger(&mut self, value: u32, read_valid: bool) {
        let core_index = ((value >> 17) & 0x3) as usize;
        let reg = (value & CNTL0_REGISTER_MASK) as usize;
        if reg >= DEBUG_REGISTER_COUNT {
            return;
        }
        if value & CNTL0_WRITE_FLAG != 0 {
            self.cores[core_index].debug_regs[reg] = self.cntl1;
            if reg == DebugRegister::Command.addr() as usize {
                self.execute(core_index, self.cntl1);
            }
        } else {
            let core = &self.cores[core_index];
            self.status1 = if reg == DebugRegister::Status.addr() as usize {
                core.status()
            } else {
                core.debug_regs[reg]
            };
            self.status0 = if read_valid { DEBUG_READ_VALID } else { 0 };
        }
    }
}

#[derive(Default)]
struct SimState {
    tiles: HashMap<CoreLocation, SimTile>,
    writes: Vec<RegisterWrite>,
    stuck_read: bool,
}

/// A set of simulated tiles reachable through [`RegisterTransport`].
#[derive(Default)]
pub struct SimulatedRisc {
    state: Mutex<SimState>,
}

impl SimulatedRisc {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the "read valid" bit never come up, like a core that is not running the debug block.
    pub fn set_read_stuck(&self, stuck: bool) {
        self.state().stuck_read = stuck;
    }

    /// All physical register writes since creation or the last [`clear_writes`](Self::clear_writes).
    pub fn writes(&self) -> Vec<RegisterWrite> {
        self.state().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    pub fn is_paused(&self, location: &CoreLocation, core_index: u8) -> bool {
        self.state()
            .tiles
            .get(location)
            .map(|tile| tile.cores[core_index as usize].paused)
            .unwrap_or(false)
    }

    pub fn debug_mode_enabled(&self, location: &CoreLocation, core_index: u8) -> bool {
        self.state()
            .tiles
            .get(location)
            .map(|tile| tile.cores[core_index as usize].debug_mode)
            .unwrap_or(false)
    }

    pub fn set_paused(&self, location: &CoreLocation, core_index: u8, paused: bool) {
        let mut state = self.state();
        let tile = state.tiles.entry(*location).or_default();
        tile.cores[core_index as usize].paused = paused;
    }

    pub fn gpr(&self, location: &CoreLocation, core_index: u8, index: u32) -> u32 {
        self.state()
            .tiles
            .get(location)
            .map(|tile| tile.cores[core_index as usize].gprs[index as usize])
            .unwrap_or(0)
    }

    pub fn debug_register(&self, location: &CoreLocation, core_index: u8, reg: u32) -> u32 {
        self.state()
            .tiles
            .get(location)
            .map(|tile| tile.cores[core_index as usize].debug_regs[reg as usize])
            .unwrap_or(0)
    }

    pub fn memory_word(&self, location: &CoreLocation, addr: u32) -> u32 {
        self.state()
            .tiles
            .get(location)
            .map(|tile| tile.read_word(addr))
            .unwrap_or(0)
    }

    pub fn set_memory_word(&self, location: &CoreLocation, addr: u32, value: u32) {
        let mut state = self.state();
        state
            .tiles
            .entry(*location)
            .or_default()
            .memory
            .insert(addr & !3, value);
    }
}

impl RegisterTransport for SimulatedRisc {
    fn read_register(
        &self,
        location: &CoreLocation,
        _noc_id: u8,
        address: u32,
    ) -> Result<u32, TransportError> {
        let mut state = self.state();
        let tile = state.tiles.entry(*location).or_default();
        Ok(match address {
            RISC_DBG_CNTL0 => tile.cntl0,
            RISC_DBG_CNTL1 => tile.cntl1,
            RISC_DBG_STATUS0 => tile.status0,
            RISC_DBG_STATUS1 => tile.status1,
            RISC_SOFT_RESET => tile.soft_reset,
            _ => tile.read_word(address),
        })
    }

    fn write_register(
        &self,
        location: &CoreLocation,
        _noc_id: u8,
        address: u32,
        value: u32,
    ) -> Result<(), TransportError> {
        let mut state = self.state();
        state.writes.push(RegisterWrite {
            location: *location,
            address,
            value,
        });
        let read_valid = !state.stuck_read;
        let tile = state.tiles.entry(*location).or_default();
        match address {
            RISC_DBG_CNTL0 => {
                tile.cntl0 = value;
                if value & CONTROL0_READ_BASE != 0 {
                    tile.trigger(value, read_valid);
                }
            }
            RISC_DBG_CNTL1 => tile.cntl1 = value,
            RISC_DBG_STATUS0 | RISC_DBG_STATUS1 => {}
            RISC_SOFT_RESET => tile.soft_reset = value,
            _ => {
                tile.memory.insert(address & !3, value);
            }
        }
        Ok(())
    }
}
