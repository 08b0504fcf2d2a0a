use std::io::Write;

use pretty_assertions::assert_eq;
use test_case::test_case;

use risc_debug_helper::error::{DebugError, LoadError};
use risc_debug_helper::location::CoreLocation;
use risc_debug_helper::risc::registers::{
    register_index, WatchpointKind, WatchpointState, RISC_DBG_CNTL0, RISC_DBG_CNTL1,
    WATCHPOINT_COUNT,
};
use risc_debug_helper::risc::sim::SimulatedRisc;
use risc_debug_helper::risc::{RiscDebug, RiscLoader, RiscTarget};

fn location() -> CoreLocation {
    CoreLocation::new(0, 1, 1)
}

fn debugger(sim: &SimulatedRisc, core_index: u8) -> RiscDebug<'_> {
    RiscDebug::new(RiscTarget::new(location(), 0, core_index), sim)
}

#[test]
fn every_trigger_is_preceded_by_a_clear() {
    let sim = SimulatedRisc::new();
    let dbg = debugger(&sim, 1);
    dbg.enable_debug().unwrap();
    dbg.halt().unwrap();
    dbg.write_gpr(3, 0xdead_beef).unwrap();
    dbg.read_gpr(3).unwrap();
    dbg.write_memory(0x100, 7).unwrap();
    dbg.read_memory(0x100).unwrap();
    dbg.set_watchpoint_on_pc_address(2, 0x40).unwrap();
    dbg.step().unwrap();
    dbg.continue_().unwrap();

    let writes = sim.writes();
    let mut triggers = 0;
    for (i, write) in writes.iter().enumerate() {
        if write.address == RISC_DBG_CNTL0 && write.value != 0 {
            triggers += 1;
            assert!(i > 0, "trigger without a preceding clear");
            let previous = writes[i - 1];
            assert_eq!((previous.address, previous.value), (RISC_DBG_CNTL0, 0));
        }
    }
    assert!(triggers > 10);
}

#[test]
fn gpr_round_trip_on_every_core() {
    let sim = SimulatedRisc::new();
    for core_index in 0..4u8 {
        let dbg = debugger(&sim, core_index);
        dbg.enable_debug().unwrap();
        dbg.halt().unwrap();
        for index in 0..33u32 {
            let value = 0x1000_0000 * (core_index as u32 + 1) + index;
            dbg.write_gpr(index, value).unwrap();
            assert_eq!(dbg.read_gpr(index).unwrap(), value);
            assert_eq!(sim.gpr(&location(), core_index, index), value);
        }
    }
    // Other cores on the tile kept their own values.
    assert_eq!(sim.gpr(&location(), 0, 5), 0x1000_0005);
    assert_eq!(sim.gpr(&location(), 3, 5), 0x4000_0005);
}

#[test]
fn watchpoint_slots_are_isolated() {
    for a in 0..WATCHPOINT_COUNT {
        for b in 0..WATCHPOINT_COUNT {
            let sim = SimulatedRisc::new();
            let dbg = debugger(&sim, 0);
            dbg.enable_debug().unwrap();
            dbg.set_watchpoint_on_memory_write(a, 0x1000 + a as u32).unwrap();
            dbg.set_watchpoint_on_memory_read(b, 0x2000 + b as u32).unwrap();

            let state_b = dbg.watchpoint_state(b).unwrap();
            assert_eq!(
                state_b,
                WatchpointState {
                    enabled: true,
                    kind: WatchpointKind::Read
                }
            );
            assert_eq!(dbg.watchpoint_address(b).unwrap(), 0x2000 + b as u32);
            if a != b {
                let state_a = dbg.watchpoint_state(a).unwrap();
                assert_eq!(
                    state_a,
                    WatchpointState {
                        enabled: true,
                        kind: WatchpointKind::Write
                    }
                );
                assert_eq!(dbg.watchpoint_address(a).unwrap(), 0x1000 + a as u32);
            }

            dbg.disable_watchpoint(b).unwrap();
            assert!(!dbg.watchpoint_state(b).unwrap().enabled);
            if a != b {
                assert!(dbg.watchpoint_state(a).unwrap().enabled);
            }
            for other in (0..WATCHPOINT_COUNT).filter(|&s| s != a && s != b) {
                assert!(!dbg.watchpoint_state(other).unwrap().enabled);
            }
        }
    }
}

#[test]
fn set_then_disable_memory_write_watchpoint() {
    let sim = SimulatedRisc::new();
    let dbg = debugger(&sim, 0);
    dbg.enable_debug().unwrap();
    assert!(!dbg.is_paused().unwrap());

    dbg.set_watchpoint_on_memory_write(3, 0x2000).unwrap();
    // Programming the watchpoint does not leave a running core halted.
    assert!(!sim.is_paused(&location(), 0));
    assert_eq!(
        dbg.watchpoint_state(3).unwrap(),
        WatchpointState {
            enabled: true,
            kind: WatchpointKind::Write
        }
    );

    dbg.halt().unwrap();
    dbg.write_memory(0x2000, 1).unwrap();
    assert!(dbg.is_memory_watchpoint_hit().unwrap());
    dbg.continue_().unwrap();

    dbg.disable_watchpoint(3).unwrap();
    assert!(!dbg.watchpoint_state(3).unwrap().enabled);
    assert_eq!(dbg.watchpoint_address(3).unwrap(), 0x2000);

    dbg.halt().unwrap();
    dbg.write_memory(0x2000, 2).unwrap();
    assert!(!dbg.is_memory_watchpoint_hit().unwrap());
}

#[test]
fn pc_watchpoint_hit_on_step() {
    let sim = SimulatedRisc::new();
    let dbg = debugger(&sim, 2);
    dbg.enable_debug().unwrap();
    dbg.halt().unwrap();
    dbg.write_gpr(32, 0x100).unwrap();
    dbg.set_watchpoint_on_pc_address(0, 0x108).unwrap();
    dbg.step().unwrap();
    assert!(!dbg.is_pc_watchpoint_hit().unwrap());
    dbg.step().unwrap();
    assert!(dbg.is_pc_watchpoint_hit().unwrap());
    assert_eq!(dbg.read_gpr(register_index("pc").unwrap()).unwrap(), 0x108);
}

#[test]
fn memory_access_needs_a_halted_core() {
    let sim = SimulatedRisc::new();
    let dbg = debugger(&sim, 0);
    dbg.enable_debug().unwrap();
    assert!(matches!(
        dbg.read_memory(0x100),
        Err(DebugError::NotHalted { .. })
    ));
    assert!(matches!(
        dbg.write_memory(0x100, 1),
        Err(DebugError::NotHalted { .. })
    ));
}

#[test]
fn halt_and_continue() {
    let sim = SimulatedRisc::new();
    let dbg = debugger(&sim, 0);
    dbg.enable_debug().unwrap();
    assert!(sim.debug_mode_enabled(&location(), 0));
    dbg.halt().unwrap();
    assert!(sim.is_paused(&location(), 0));
    // Halting a halted core is a warning, not an error.
    dbg.halt().unwrap();
    dbg.continue_().unwrap();
    assert!(!sim.is_paused(&location(), 0));
    dbg.continue_().unwrap();
}

#[test_case(false ; "lenient")]
#[test_case(true ; "strict")]
fn stale_reads(strict: bool) {
    let sim = SimulatedRisc::new();
    let dbg = debugger(&sim, 0).with_strict_reads(strict);
    dbg.enable_debug().unwrap();
    dbg.write_gpr(5, 0x1234).unwrap();
    sim.set_read_stuck(true);

    let result = dbg.read_gpr(5);
    if strict {
        assert!(matches!(
            result,
            Err(DebugError::StaleRead { value: 0x1234, .. })
        ));
    } else {
        assert_eq!(result.unwrap(), 0x1234);
    }
}

#[test]
fn reset_signal() {
    let sim = SimulatedRisc::new();
    let dbg = debugger(&sim, 2);
    assert!(!dbg.is_in_reset().unwrap());
    dbg.set_reset_signal(true).unwrap();
    assert!(dbg.is_in_reset().unwrap());
    assert!(matches!(
        dbg.assert_not_in_reset(),
        Err(DebugError::InReset { .. })
    ));
    // Only this core's line moved.
    assert!(!debugger(&sim, 1).is_in_reset().unwrap());
    dbg.set_reset_signal(false).unwrap();
    dbg.assert_not_in_reset().unwrap();
}

#[test]
fn instruction_cache_invalidation_pulses_the_core_bit() {
    const IC_INVALIDATE: u32 = 0xFFEF_0000 + 157 * 4;
    let sim = SimulatedRisc::new();
    let dbg = debugger(&sim, 2);
    dbg.enable_debug().unwrap();
    dbg.halt().unwrap();
    sim.clear_writes();

    dbg.invalidate_instruction_cache().unwrap();
    let args: Vec<u32> = sim
        .writes()
        .iter()
        .filter(|w| w.address == RISC_DBG_CNTL1)
        .map(|w| w.value)
        .collect();
    assert!(args.windows(2).any(|pair| pair == [1 << 2, IC_INVALIDATE]));
    assert_eq!(sim.memory_word(&location(), IC_INVALIDATE), 0);
}

#[test]
#[should_panic]
fn core_index_out_of_range() {
    RiscTarget::new(location(), 0, 4);
}

#[test]
#[should_panic]
fn watchpoint_slot_out_of_range() {
    let sim = SimulatedRisc::new();
    let _ = debugger(&sim, 0).set_watchpoint_on_pc_address(8, 0x100);
}

#[test]
fn loader_routes_private_memory_through_debug() {
    let sim = SimulatedRisc::new();
    let loader = RiscLoader::new(location(), 0, &sim);
    let data = [1u8, 2, 3, 4, 5];

    loader.write_block(0xFFB0_0100, &data).unwrap();
    assert_eq!(sim.memory_word(&location(), 0xFFB0_0100), 0x0403_0201);
    assert_eq!(sim.memory_word(&location(), 0xFFB0_0104), 5);
    assert!(sim.writes().iter().any(|w| w.address == RISC_DBG_CNTL0));
    // The core was running before, so it is resumed.
    assert!(!sim.is_paused(&location(), 0));
    assert_eq!(loader.read_block(0xFFB0_0100, 5).unwrap(), data.to_vec());

    sim.clear_writes();
    loader.write_block(0x6000, &data).unwrap();
    assert!(sim.writes().iter().all(|w| w.address != RISC_DBG_CNTL0));
    assert_eq!(sim.memory_word(&location(), 0x6004), 5);
    assert_eq!(loader.read_block(0x6000, 5).unwrap(), data.to_vec());
}

#[test]
fn loader_rejects_garbage_files() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"definitely not an ELF image").unwrap();

    let sim = SimulatedRisc::new();
    let loader = RiscLoader::new(location(), 0, &sim);
    assert!(matches!(
        loader.load_elf(file.path()),
        Err(DebugError::Load(LoadError::Object(_)))
    ));
}

#[test]
fn loader_reports_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimulatedRisc::new();
    let loader = RiscLoader::new(location(), 0, &sim);
    assert!(matches!(
        loader.load_elf(&dir.path().join("missing.elf")),
        Err(DebugError::Load(LoadError::Io { .. }))
    ));
}
