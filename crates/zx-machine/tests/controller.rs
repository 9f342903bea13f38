//! Execution controller: lifecycle transitions, run modes, cancellation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use zx_core::{MachineEvents, MachineState, NullEvents};
use zx_machine::{
    ExecutionController, ExecutionOptions, MachineConfig, StepMode, StopReason,
};

/// Records every state transition.
#[derive(Clone, Default)]
struct TransitionLog {
    log: Arc<Mutex<Vec<(MachineState, MachineState)>>>,
}

impl MachineEvents for TransitionLog {
    fn state_changed(&mut self, old: MachineState, new: MachineState) {
        self.log.lock().expect("log lock").push((old, new));
    }
}

/// A 16K ROM with the given bytes at the start.
fn rom_with(program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 0x4000];
    rom[..program.len()].copy_from_slice(program);
    rom
}

fn build_controller(program: &[u8]) -> (ExecutionController, TransitionLog) {
    let log = TransitionLog::default();
    let mut controller = ExecutionController::new(Box::new(log.clone()));
    controller
        .build(&MachineConfig::spectrum_48k(rom_with(program)))
        .expect("valid config");
    (controller, log)
}

#[test]
fn build_walks_the_documented_states() {
    let (controller, log) = build_controller(&[0x76]);
    assert_eq!(controller.state(), MachineState::BeforeRun);
    assert_eq!(
        *log.log.lock().expect("log lock"),
        vec![
            (MachineState::None, MachineState::BuildingMachine),
            (MachineState::BuildingMachine, MachineState::BeforeRun),
        ]
    );
}

#[test]
fn build_twice_is_a_noop() {
    let (mut controller, log) = build_controller(&[0x76]);
    controller
        .build(&MachineConfig::spectrum_48k(rom_with(&[0x00])))
        .expect("no-op build");
    assert_eq!(log.log.lock().expect("log lock").len(), 2);
}

#[test]
fn until_halt_pauses_with_halted_reason() {
    // DI; HALT
    let (mut controller, log) = build_controller(&[0xF3, 0x76]);
    let reason = controller.run(&ExecutionOptions::until_halt());
    assert_eq!(reason, StopReason::Halted);
    assert_eq!(controller.state(), MachineState::Paused);

    let transitions = log.log.lock().expect("log lock").clone();
    assert!(transitions.contains(&(MachineState::BeforeRun, MachineState::Running)));
    assert!(transitions.contains(&(MachineState::Running, MachineState::Pausing)));
    assert!(transitions.contains(&(MachineState::Pausing, MachineState::Paused)));
}

#[test]
fn until_execution_point_stops_at_address() {
    // A short run of NOPs
    let (mut controller, _) = build_controller(&[0x00; 16]);
    let reason = controller.run(&ExecutionOptions::until_execution_point(0x0005));
    assert_eq!(reason, StopReason::ExecutionPoint);
    let machine = controller.machine().expect("machine built");
    assert_eq!(machine.cpu().regs.pc, 0x0005);
}

#[test]
fn resume_continues_from_paused() {
    let (mut controller, _) = build_controller(&[0x00; 32]);
    let _ = controller.run(&ExecutionOptions::until_execution_point(0x0004));
    assert_eq!(controller.state(), MachineState::Paused);

    let reason = controller.run(&ExecutionOptions::until_execution_point(0x000A));
    assert_eq!(reason, StopReason::ExecutionPoint);
    let machine = controller.machine().expect("machine built");
    assert_eq!(machine.cpu().regs.pc, 0x000A);
}

#[test]
fn stop_from_paused_is_terminal() {
    let (mut controller, _) = build_controller(&[0xF3, 0x76]);
    let _ = controller.run(&ExecutionOptions::until_halt());
    controller.stop();
    assert_eq!(controller.state(), MachineState::Stopped);

    // Totality: every further request is a no-op, nothing panics
    controller.pause();
    controller.stop();
    let reason = controller.run(&ExecutionOptions::continuous());
    assert_eq!(reason, StopReason::Stopped);
    assert_eq!(controller.state(), MachineState::Stopped);
}

#[test]
fn requests_before_build_are_noops() {
    let mut controller = ExecutionController::new(Box::new(NullEvents));
    controller.pause();
    controller.stop();
    assert_eq!(controller.state(), MachineState::None);
    let reason = controller.run(&ExecutionOptions::continuous());
    assert_eq!(reason, StopReason::Stopped);
}

#[test]
fn timeout_is_reported_distinctly() {
    // An endless loop: JR -2
    let (mut controller, _) = build_controller(&[0x18, 0xFE]);
    let options = ExecutionOptions::continuous().with_timeout(Duration::from_millis(20));
    let reason = controller.run(&options);
    assert_eq!(reason, StopReason::Timeout);
    assert_eq!(controller.state(), MachineState::Paused);
}

#[test]
fn breakpoint_hits_in_debugger_mode() {
    let (mut controller, _) = build_controller(&[0x00; 32]);
    controller.breakpoints_mut().add(0x0008);
    let reason = controller.run(&ExecutionOptions::debugger(StepMode::None));
    assert_eq!(reason, StopReason::Breakpoint);
    let machine = controller.machine().expect("machine built");
    assert_eq!(machine.cpu().regs.pc, 0x0008);
}

#[test]
fn breakpoints_ignored_outside_debugger_mode() {
    let (mut controller, _) = build_controller(&[0x00; 32]);
    controller.breakpoints_mut().add(0x0008);
    let reason = controller.run(&ExecutionOptions::until_execution_point(0x0010));
    assert_eq!(reason, StopReason::ExecutionPoint);
}

#[test]
fn imminent_breakpoint_fires_once() {
    // Endless NOP field; run twice against the same one-shot address
    let (mut controller, _) = build_controller(&[0x00; 64]);
    controller.breakpoints_mut().set_imminent(0x0006);
    let reason = controller.run(&ExecutionOptions::debugger(StepMode::None));
    assert_eq!(reason, StopReason::Breakpoint);

    controller.breakpoints_mut().add(0x0020);
    let reason = controller.run(&ExecutionOptions::debugger(StepMode::None));
    assert_eq!(reason, StopReason::Breakpoint);
    let machine = controller.machine().expect("machine built");
    assert_eq!(
        machine.cpu().regs.pc, 0x0020,
        "the imminent breakpoint must not fire again"
    );
}

#[test]
fn step_into_executes_one_instruction() {
    let (mut controller, _) = build_controller(&[0x00; 8]);
    let reason = controller.run(&ExecutionOptions::debugger(StepMode::Into));
    assert_eq!(reason, StopReason::StepCompleted);
    let machine = controller.machine().expect("machine built");
    assert_eq!(machine.cpu().regs.pc, 0x0001);
    assert_eq!(machine.tacts(), 4);
}

#[test]
fn step_over_runs_a_call_to_completion() {
    // 0000: CALL $0010 / 0003: NOP...   0010: INC A; INC A; RET
    let mut program = vec![0xCD, 0x10, 0x00];
    program.resize(0x10, 0x00);
    program.extend_from_slice(&[0x3C, 0x3C, 0xC9]);
    let (mut controller, _) = build_controller(&program);
    {
        let machine = controller.machine_mut().expect("machine built");
        machine.cpu_mut().regs.sp = 0x8000;
    }

    let reason = controller.run(&ExecutionOptions::debugger(StepMode::Over));
    assert_eq!(reason, StopReason::StepCompleted);
    let machine = controller.machine().expect("machine built");
    assert_eq!(machine.cpu().regs.pc, 0x0003, "stopped after the call");
    assert_eq!(machine.cpu().regs.a, 2, "the subroutine ran");
    assert_eq!(machine.cpu().regs.sp, 0x8000);
}

#[test]
fn step_over_plain_instruction_acts_like_step_into() {
    let (mut controller, _) = build_controller(&[0x00; 8]);
    let reason = controller.run(&ExecutionOptions::debugger(StepMode::Over));
    assert_eq!(reason, StopReason::StepCompleted);
    let machine = controller.machine().expect("machine built");
    assert_eq!(machine.cpu().regs.pc, 0x0001);
}

#[test]
fn cross_thread_pause_takes_effect_at_a_boundary() {
    // Endless loop
    let (mut controller, _) = build_controller(&[0x18, 0xFE]);
    let handle = controller.control_handle();

    let pauser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        handle.request_pause();
    });

    let reason = controller.run(&ExecutionOptions::continuous());
    assert_eq!(reason, StopReason::Paused);
    assert_eq!(controller.state(), MachineState::Paused);
    pauser.join().expect("pauser thread");
}

#[test]
fn cross_thread_stop_is_terminal() {
    let (mut controller, _) = build_controller(&[0x18, 0xFE]);
    let handle = controller.control_handle();

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        handle.request_stop();
    });

    let reason = controller.run(&ExecutionOptions::continuous());
    assert_eq!(reason, StopReason::Stopped);
    assert_eq!(controller.state(), MachineState::Stopped);
    stopper.join().expect("stopper thread");
}

#[test]
fn bad_config_leaves_controller_buildable() {
    let mut controller = ExecutionController::new(Box::new(NullEvents));
    let err = controller.build(&MachineConfig::spectrum_48k(vec![0; 3]));
    assert!(err.is_err());
    assert_eq!(controller.state(), MachineState::None);

    controller
        .build(&MachineConfig::spectrum_48k(rom_with(&[0x76])))
        .expect("second build succeeds");
    assert_eq!(controller.state(), MachineState::BeforeRun);
}
