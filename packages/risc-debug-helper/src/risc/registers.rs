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

//! Layout of the RISC debug register block and the bits inside it.

use crate::error::DebugError;

/// Slots of the debug register space. These are not memory addresses; they are
/// the low bits of a trigger written to `RISC_DBG_CNTL0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DebugRegister {
    Status = 0,
    Command = 1,
    CommandArg0 = 2,
    CommandArg1 = 3,
    CommandReturnValue = 4,
    WatchpointSettings = 5,
}

impl DebugRegister {
    pub fn addr(self) -> u32 {
        self as u32
    }
}

/// First of the eight watchpoint address slots (`REG_HW_WATCHPOINT_0 .. _7`).
pub const REG_WATCHPOINT_BASE: u32 = 10;
pub const WATCHPOINT_COUNT: usize = 8;

pub fn watchpoint_register(slot: usize) -> u32 {
    assert!(slot < WATCHPOINT_COUNT, "watchpoint slot {slot} out of range");
    REG_WATCHPOINT_BASE + slot as u32
}

// Physical registers used to reach the debug register space.
pub const RISC_DBG_CNTL0: u32 = 0xFFB1_2080;
pub const RISC_DBG_CNTL1: u32 = 0xFFB1_2084;
pub const RISC_DBG_STATUS0: u32 = 0xFFB1_2088;
pub const RISC_DBG_STATUS1: u32 = 0xFFB1_208C;

/// Soft reset register; one bit per RISC (see [`reset_shift`]).
pub const RISC_SOFT_RESET: u32 = 0xFFB1_21B0;

pub const CONTROL0_WRITE_BASE: u32 = 0x8001_0000;
pub const CONTROL0_READ_BASE: u32 = 0x8000_0000;

/// Bit in `RISC_DBG_STATUS0` set by hardware once `RISC_DBG_STATUS1` holds the requested value.
pub const DEBUG_READ_VALID: u32 = 1 << 30;

/// Status register bits.
pub mod status {
    pub const PAUSED: u32 = 0x1;
    pub const PC_WATCHPOINT_HIT: u32 = 0x2;
    pub const MEMORY_WATCHPOINT_HIT: u32 = 0x4;
}

/// Command register bits. `DEBUG_MODE` is ORed with exactly one action bit.
pub mod command {
    pub const PAUSE: u32 = 0x0000_0001;
    /// Resume for one cycle.
    pub const STEP: u32 = 0x0000_0002;
    pub const CONTINUE: u32 = 0x0000_0004;
    pub const READ_REGISTER: u32 = 0x0000_0008;
    pub const WRITE_REGISTER: u32 = 0x0000_0010;
    pub const READ_MEMORY: u32 = 0x0000_0020;
    pub const WRITE_MEMORY: u32 = 0x0000_0040;
    pub const FLUSH_REGISTERS: u32 = 0x0000_0080;
    pub const FLUSH: u32 = 0x0000_0100;
    pub const DEBUG_MODE: u32 = 0x8000_0000;
}

/// What a watchpoint slot triggers on. The discriminant is the low bits of the slot's nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchpointKind {
    Breakpoint = 0,
    Read = 1,
    Write = 2,
    Access = 3,
}

pub const WATCHPOINT_ENABLED: u32 = 0x8;
pub const WATCHPOINT_MASK: u32 = 0xF;

/// Decoded nibble of `WatchpointSettings` for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchpointState {
    pub enabled: bool,
    pub kind: WatchpointKind,
}

impl WatchpointState {
    pub fn encode(self) -> u32 {
        let enabled = if self.enabled { WATCHPOINT_ENABLED } else { 0 };
        enabled | self.kind as u32
    }

    pub fn decode(nibble: u32) -> Self {
        let kind = match nibble & 0x3 {
            0 => WatchpointKind::Breakpoint,
            1 => WatchpointKind::Read,
            2 => WatchpointKind::Write,
            _ => WatchpointKind::Access,
        };
        Self {
            enabled: nibble & WATCHPOINT_ENABLED != 0,
            kind,
        }
    }

    /// Extract slot `slot` from a full `WatchpointSettings` value.
    pub fn from_settings(settings: u32, slot: usize) -> Self {
        assert!(slot < WATCHPOINT_COUNT, "watchpoint slot {slot} out of range");
        Self::decode((settings >> (slot * 4)) & WATCHPOINT_MASK)
    }
}

/// Replace the 4-bit field of `slot` inside `settings` with `nibble`.
pub fn update_watchpoint_field(settings: u32, slot: usize, nibble: u32) -> u32 {
    assert!(slot < WATCHPOINT_COUNT, "watchpoint slot {slot} out of range");
    assert!(nibble <= WATCHPOINT_MASK);
    let shift = slot * 4;
    (settings & !(WATCHPOINT_MASK << shift)) | (nibble << shift)
}

/// Index of the program counter in GPR space.
pub const PC_REGISTER_INDEX: u32 = 32;

pub const RISCV_REGISTER_NAMES: [&str; 33] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0 / fp", "s1", "a0", "a1", "a2", "a3",
    "a4", "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3",
    "t4", "t5", "t6", "pc",
];

pub fn register_name(index: u32) -> Option<&'static str> {
    RISCV_REGISTER_NAMES.get(index as usize).copied()
}

/// Accept either a decimal index or an ABI register name (case-insensitive, `fp` finds `s0 / fp`).
pub fn register_index(index_or_name: &str) -> Result<u32, DebugError> {
    if let Ok(index) = index_or_name.parse::<u32>() {
        if (index as usize) < RISCV_REGISTER_NAMES.len() {
            return Ok(index);
        }
        return Err(DebugError::UnknownRegister(index_or_name.to_string()));
    }
    let wanted = index_or_name.to_lowercase();
    // exact names first so "s1" does not match "s10"
    if let Some(pos) = RISCV_REGISTER_NAMES
        .iter()
        .position(|name| name.split(" / ").any(|n| n == wanted))
    {
        return Ok(pos as u32);
    }
    Err(DebugError::UnknownRegister(index_or_name.to_string()))
}

pub const RISC_NAMES: [&str; 4] = ["BRISC", "TRISC0", "TRISC1", "TRISC2"];

pub fn risc_name(core_index: u8) -> String {
    match RISC_NAMES.get(core_index as usize) {
        Some(name) => name.to_string(),
        None => format!("Unknown RISC id {core_index}"),
    }
}

pub fn risc_index(name: &str) -> Result<u8, DebugError> {
    let wanted = name.to_lowercase();
    RISC_NAMES
        .iter()
        .position(|n| n.to_lowercase() == wanted)
        .map(|i| i as u8)
        .ok_or_else(|| DebugError::UnknownCore(name.to_string()))
}

/// Bit position of a core's reset line inside [`RISC_SOFT_RESET`].
pub fn reset_shift(core_index: u8) -> u32 {
    match core_index {
        0 => 11,
        1 => 12,
        2 => 13,
        3 => 14,
        _ => panic!("invalid RISC id {core_index}"),
    }
}
