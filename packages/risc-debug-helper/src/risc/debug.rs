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

/// Debug protocol for one RISC core: halt/step/continue, GPR and memory access,
/// hardware watchpoints. Every operation is a short, fixed sequence of register
/// transactions against `RISC_DBG_CNTL0/1` and `RISC_DBG_STATUS0/1`.
use crate::error::DebugError;
use crate::location::CoreLocation;
use crate::risc::registers::*;
use crate::risc::transport::RegisterTransport;

/// How many times `RISC_DBG_STATUS0` is polled for "read valid" before a read is treated as stale.
pub const READ_VALID_POLLS: usize = 3;

/// Number of cores with a debug interface at each location.
pub const RISC_CORE_COUNT: u8 = 4;

/// The core one [`RiscDebug`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RiscTarget {
    pub location: CoreLocation,
    pub noc_id: u8,
    pub core_index: u8,
}

impl RiscTarget {
    pub fn new(location: CoreLocation, noc_id: u8, core_index: u8) -> Self {
        assert!(
            core_index < RISC_CORE_COUNT,
            "invalid RISC id ({core_index})"
        );
        Self {
            location,
            noc_id,
            core_index,
        }
    }

    pub fn name(&self) -> String {
        format!("{} at {}", risc_name(self.core_index), self.location)
    }
}

pub struct RiscDebug<'a> {
    target: RiscTarget,
    transport: &'a dyn RegisterTransport,
    control0_write: u32,
    control0_read: u32,
    verbose: bool,
    strict_reads: bool,
}

impl<'a> RiscDebug<'a> {
    pub fn new(target: RiscTarget, transport: &'a dyn RegisterTransport) -> Self {
        let core_bits = (target.core_index as u32) << 17;
        Self {
            target,
            transport,
            control0_write: CONTROL0_WRITE_BASE | core_bits,
            control0_read: CONTROL0_READ_BASE | core_bits,
            verbose: false,
            strict_reads: false,
        }
    }

    /// Log every physical register transaction at debug level.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Fail reads whose "read valid" bit never came up instead of returning the stale value.
    pub fn with_strict_reads(mut self, strict: bool) -> Self {
        self.strict_reads = strict;
        self
    }

    pub fn target(&self) -> &RiscTarget {
        &self.target
    }

    fn write(&self, addr: u32, data: u32) -> Result<(), DebugError> {
        if self.verbose {
            log::debug!("{} <- WR   0x{:08x}", physical_register_name(addr), data);
        }
        self.transport
            .write_register(&self.target.location, self.target.noc_id, addr, data)?;
        Ok(())
    }

    fn read(&self, addr: u32) -> Result<u32, DebugError> {
        let data =
            self.transport
                .read_register(&self.target.location, self.target.noc_id, addr)?;
        if self.verbose {
            log::debug!("{} -> RD == 0x{:08x}", physical_register_name(addr), data);
        }
        Ok(data)
    }

    // CNTL0 latches the previous trigger, so it is always cleared before the new one is set.
    fn trigger_write(&self, reg_addr: u32) -> Result<(), DebugError> {
        self.write(RISC_DBG_CNTL0, 0)?;
        self.write(RISC_DBG_CNTL0, self.control0_write | reg_addr)
    }

    fn trigger_read(&self, reg_addr: u32) -> Result<(), DebugError> {
        self.write(RISC_DBG_CNTL0, 0)?;
        self.write(RISC_DBG_CNTL0, self.control0_read | reg_addr)
    }

    fn riscv_write(&self, reg_addr: u32, value: u32) -> Result<(), DebugError> {
        self.write(RISC_DBG_CNTL1, value)?;
        self.trigger_write(reg_addr)
    }

    fn is_read_valid(&self) -> Result<bool, DebugError> {
        Ok(self.read(RISC_DBG_STATUS0)? & DEBUG_READ_VALID == DEBUG_READ_VALID)
    }

    fn riscv_read(&self, reg_addr: u32) -> Result<u32, DebugError> {
        self.trigger_read(reg_addr)?;

        let mut valid = false;
        for _ in 0..READ_VALID_POLLS {
            if self.is_read_valid()? {
                valid = true;
                break;
            }
        }

        let value = self.read(RISC_DBG_STATUS1)?;
        if !valid {
            if self.strict_reads {
                return Err(DebugError::StaleRead {
                    register: reg_addr,
                    value,
                });
            }
            log::warn!(
                "Reading from {} debug register {} failed (read valid bit is 0); the core may not be halted or active",
                self.target.name(),
                reg_addr
            );
        }
        Ok(value)
    }

    fn command(&self, action: u32) -> Result<(), DebugError> {
        self.riscv_write(DebugRegister::Command.addr(), command::DEBUG_MODE | action)
    }

    fn status(&self) -> Result<u32, DebugError> {
        self.riscv_read(DebugRegister::Status.addr())
    }

    pub fn enable_debug(&self) -> Result<(), DebugError> {
        if self.verbose {
            log::debug!("enable_debug() on {}", self.target.name());
        }
        self.command(0)
    }

    pub fn halt(&self) -> Result<(), DebugError> {
        if self.is_paused()? {
            log::warn!("Halt: {} is already halted", self.target.name());
            return Ok(());
        }
        self.command(command::PAUSE)?;
        if !self.is_paused()? {
            return Err(DebugError::HaltFailed {
                core: self.target.name(),
            });
        }
        Ok(())
    }

    pub fn step(&self) -> Result<(), DebugError> {
        self.command(command::STEP)
    }

    pub fn continue_(&self) -> Result<(), DebugError> {
        if !self.is_paused()? {
            log::warn!("Continue: {} is already running", self.target.name());
            return Ok(());
        }
        self.command(command::CONTINUE)?;
        if self.is_paused()? {
            return Err(DebugError::ContinueFailed {
                core: self.target.name(),
            });
        }
        Ok(())
    }

    pub fn is_paused(&self) -> Result<bool, DebugError> {
        Ok(self.status()? & status::PAUSED != 0)
    }

    pub fn is_pc_watchpoint_hit(&self) -> Result<bool, DebugError> {
        Ok(self.status()? & status::PC_WATCHPOINT_HIT != 0)
    }

    pub fn is_memory_watchpoint_hit(&self) -> Result<bool, DebugError> {
        Ok(self.status()? & status::MEMORY_WATCHPOINT_HIT != 0)
    }

    /// Run `f` with the core halted. A core that was running is resumed afterwards,
    /// also when `f` fails.
    pub fn ensure_halted<R>(
        &self,
        f: impl FnOnce(&Self) -> Result<R, DebugError>,
    ) -> Result<R, DebugError> {
        let was_halted = self.is_paused()?;
        if !was_halted {
            self.halt()?;
        }
        let result = f(self);
        if !was_halted {
            self.continue_()?;
        }
        result
    }

    pub fn assert_halted(&self) -> Result<(), DebugError> {
        if !self.is_paused()? {
            return Err(DebugError::NotHalted {
                core: self.target.name(),
            });
        }
        Ok(())
    }

    pub fn read_gpr(&self, index: u32) -> Result<u32, DebugError> {
        assert!(index <= PC_REGISTER_INDEX, "invalid register index {index}");
        self.riscv_write(DebugRegister::CommandArg0.addr(), index)?;
        self.command(command::READ_REGISTER)?;
        self.riscv_read(DebugRegister::CommandReturnValue.addr())
    }

    pub fn write_gpr(&self, index: u32, value: u32) -> Result<(), DebugError> {
        assert!(index <= PC_REGISTER_INDEX, "invalid register index {index}");
        self.riscv_write(DebugRegister::CommandArg1.addr(), value)?;
        self.riscv_write(DebugRegister::CommandArg0.addr(), index)?;
        self.command(command::WRITE_REGISTER)
    }

    pub fn read_memory(&self, addr: u32) -> Result<u32, DebugError> {
        self.assert_halted()?;
        self.riscv_write(DebugRegister::CommandArg0.addr(), addr)?;
        self.command(command::READ_MEMORY)?;
        let data = self.riscv_read(DebugRegister::CommandReturnValue.addr())?;
        if self.verbose {
            log::debug!("read_memory(0x{addr:08x}) -> 0x{data:08x}");
        }
        Ok(data)
    }

    pub fn write_memory(&self, addr: u32, value: u32) -> Result<(), DebugError> {
        self.assert_halted()?;
        self.riscv_write(DebugRegister::CommandArg1.addr(), value)?;
        self.riscv_write(DebugRegister::CommandArg0.addr(), addr)?;
        self.command(command::WRITE_MEMORY)
    }

    fn update_watchpoint_setting(&self, slot: usize, nibble: u32) -> Result<(), DebugError> {
        self.ensure_halted(|dbg| {
            let old = dbg.riscv_read(DebugRegister::WatchpointSettings.addr())?;
            let new = update_watchpoint_field(old, slot, nibble);
            dbg.riscv_write(DebugRegister::WatchpointSettings.addr(), new)
        })
    }

    fn set_watchpoint(
        &self,
        slot: usize,
        address: u32,
        kind: WatchpointKind,
    ) -> Result<(), DebugError> {
        let reg = watchpoint_register(slot);
        let state = WatchpointState {
            enabled: true,
            kind,
        };
        self.ensure_halted(|dbg| {
            dbg.riscv_write(reg, address)?;
            dbg.update_watchpoint_setting(slot, state.encode())
        })
    }

    pub fn set_watchpoint_on_pc_address(&self, slot: usize, address: u32) -> Result<(), DebugError> {
        self.set_watchpoint(slot, address, WatchpointKind::Breakpoint)
    }

    pub fn set_watchpoint_on_memory_read(&self, slot: usize, address: u32) -> Result<(), DebugError> {
        self.set_watchpoint(slot, address, WatchpointKind::Read)
    }

    pub fn set_watchpoint_on_memory_write(&self, slot: usize, address: u32) -> Result<(), DebugError> {
        self.set_watchpoint(slot, address, WatchpointKind::Write)
    }

    pub fn set_watchpoint_on_memory_access(
        &self,
        slot: usize,
        address: u32,
    ) -> Result<(), DebugError> {
        self.set_watchpoint(slot, address, WatchpointKind::Access)
    }

    /// Clears the slot's settings nibble. The address register keeps its value.
    pub fn disable_watchpoint(&self, slot: usize) -> Result<(), DebugError> {
        watchpoint_register(slot);
        self.update_watchpoint_setting(slot, 0)
    }

    pub fn watchpoint_state(&self, slot: usize) -> Result<WatchpointState, DebugError> {
        let settings = self.riscv_read(DebugRegister::WatchpointSettings.addr())?;
        Ok(WatchpointState::from_settings(settings, slot))
    }

    pub fn watchpoint_address(&self, slot: usize) -> Result<u32, DebugError> {
        self.riscv_read(watchpoint_register(slot))
    }

    // The reset register is always reached over NoC 0.
    fn read_reset_register(&self) -> Result<u32, DebugError> {
        Ok(self
            .transport
            .read_register(&self.target.location, 0, RISC_SOFT_RESET)?)
    }

    pub fn is_in_reset(&self) -> Result<bool, DebugError> {
        let shift = reset_shift(self.target.core_index);
        Ok((self.read_reset_register()? >> shift) & 1 == 1)
    }

    /// Assert (`true`) or deassert (`false`) the core's reset line.
    pub fn set_reset_signal(&self, asserted: bool) -> Result<(), DebugError> {
        let shift = reset_shift(self.target.core_index);
        let old = self.read_reset_register()?;
        let new = (old & !(1 << shift)) | ((asserted as u32) << shift);
        self.transport
            .write_register(&self.target.location, 0, RISC_SOFT_RESET, new)?;
        let readback = self.read_reset_register()?;
        if readback != new {
            log::error!(
                "Error writing reset signal. Expected 0x{new:08x}, got 0x{readback:08x}"
            );
        }
        Ok(())
    }

    pub fn assert_not_in_reset(&self) -> Result<(), DebugError> {
        if self.is_in_reset()? {
            return Err(DebugError::InReset {
                core: self.target.name(),
            });
        }
        Ok(())
    }

    pub fn invalidate_instruction_cache(&self) -> Result<(), DebugError> {
        const TENSIX_CFG_BASE: u32 = 0xFFEF_0000;
        const RISCV_IC_INVALIDATE_ADDR32: u32 = 157;
        let reg = TENSIX_CFG_BASE + RISCV_IC_INVALIDATE_ADDR32 * 4;
        self.write_memory(reg, 1 << self.target.core_index)?;
        self.write_memory(reg, 0)
    }
}

fn physical_register_name(addr: u32) -> String {
    match addr {
        RISC_DBG_CNTL0 => "CNTL0".to_string(),
        RISC_DBG_CNTL1 => "CNTL1".to_string(),
        RISC_DBG_STATUS0 => "STATUS0".to_string(),
        RISC_DBG_STATUS1 => "STATUS1".to_string(),
        other => format!("0x{other:08x}"),
    }
}
