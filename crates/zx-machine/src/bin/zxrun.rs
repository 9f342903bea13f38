//! Headless machine runner.
//!
//! Boots a ROM image, runs it for a number of wall-clock seconds, then
//! dumps the machine state. Useful for smoke-testing ROMs and timing
//! changes without a front end.
//!
//! Usage:
//!   zxrun <rom.bin> [seconds]
//!
//! The model is picked from the ROM size: 16K = 48K machine, 32K = 128K.

use std::env;
use std::process::ExitCode;
use std::time::Duration;

use zx_core::NullEvents;
use zx_machine::{ExecutionController, ExecutionOptions, MachineConfig, StopReason};
use zx_z80::disasm;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = env::args().skip(1);
    let Some(rom_path) = args.next() else {
        eprintln!("usage: zxrun <rom.bin> [seconds]");
        return ExitCode::FAILURE;
    };
    let seconds: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(1);

    let rom = match std::fs::read(&rom_path) {
        Ok(rom) => rom,
        Err(err) => {
            eprintln!("cannot read {rom_path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let config = match rom.len() {
        0x4000 => MachineConfig::spectrum_48k(rom),
        0x8000 => MachineConfig::spectrum_128k(rom),
        other => {
            eprintln!("ROM must be 16K or 32K, got {other} bytes");
            return ExitCode::FAILURE;
        }
    };

    let mut controller = ExecutionController::new(Box::new(NullEvents));
    if let Err(err) = controller.build(&config) {
        eprintln!("cannot build machine: {err}");
        return ExitCode::FAILURE;
    }

    let options = ExecutionOptions::continuous().with_timeout(Duration::from_secs(seconds));
    let reason = controller.run(&options);
    assert!(
        matches!(reason, StopReason::Timeout),
        "continuous run can only end by timeout, got {reason:?}"
    );

    let Some(machine) = controller.machine() else {
        return ExitCode::FAILURE;
    };
    let regs = &machine.cpu().regs;
    let pc_bytes: Vec<u8> = (0..4)
        .map(|i| machine.bus().memory.peek(regs.pc.wrapping_add(i)))
        .collect();
    let next = disasm::disassemble(&pc_bytes, regs.pc);

    println!("frames: {}  tacts: {}", machine.frame_count(), machine.tacts());
    println!(
        "AF ${:04X}  BC ${:04X}  DE ${:04X}  HL ${:04X}",
        regs.af(),
        regs.bc(),
        regs.de(),
        regs.hl()
    );
    println!(
        "IX ${:04X}  IY ${:04X}  SP ${:04X}  PC ${:04X}  IM {}  IFF1 {}",
        regs.ix, regs.iy, regs.sp, regs.pc, regs.im, regs.iff1
    );
    println!("border: {}  next: {}", machine.bus().border, next.text);
    ExitCode::SUCCESS
}
