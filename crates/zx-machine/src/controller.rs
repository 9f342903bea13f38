//! The execution controller: lifecycle state machine and run loop.
//!
//! One controller owns one machine instance and drives it synchronously.
//! Cancellation is cooperative: pause/stop requests are atomic flags in a
//! cloneable handle, polled once per instruction, so they take effect at
//! an instruction boundary and external readers only ever see committed
//! state. A stopped controller is terminal; build a new one to run again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use zx_core::{MachineEvents, MachineState};
use zx_z80::disasm;

use crate::breakpoints::Breakpoints;
use crate::config::{MachineConfig, MachineError};
use crate::options::{ExecutionMode, ExecutionOptions, StepMode, StopReason};
use crate::spectrum::Spectrum;

/// Wall-clock length of one 48K frame, used for real-time pacing.
const FRAME_DURATION: Duration = Duration::from_micros(19_968);

/// Cancellation flags shared with [`ControlHandle`]s.
#[derive(Debug, Default)]
struct Signals {
    pause: AtomicBool,
    stop: AtomicBool,
}

/// Cloneable handle for requesting pause/stop from outside the run loop
/// (typically another thread). Requests are polled at instruction
/// boundaries; they never interrupt an instruction.
#[derive(Clone)]
pub struct ControlHandle {
    signals: Arc<Signals>,
}

impl ControlHandle {
    /// Ask the run loop to pause at the next instruction boundary.
    pub fn request_pause(&self) {
        self.signals.pause.store(true, Ordering::Release);
    }

    /// Ask the run loop to stop (terminally) at the next boundary.
    pub fn request_stop(&self) {
        self.signals.stop.store(true, Ordering::Release);
    }
}

/// Owns a machine and its lifecycle.
pub struct ExecutionController {
    machine: Option<Spectrum>,
    state: MachineState,
    events: Box<dyn MachineEvents>,
    breakpoints: Breakpoints,
    signals: Arc<Signals>,
}

impl ExecutionController {
    /// A controller in the `None` state; `build` creates the machine.
    #[must_use]
    pub fn new(events: Box<dyn MachineEvents>) -> Self {
        Self {
            machine: None,
            state: MachineState::None,
            events,
            breakpoints: Breakpoints::new(),
            signals: Arc::new(Signals::default()),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MachineState {
        self.state
    }

    /// The machine, once built.
    #[must_use]
    pub fn machine(&self) -> Option<&Spectrum> {
        self.machine.as_ref()
    }

    /// Mutable machine access; use only between runs.
    pub fn machine_mut(&mut self) -> Option<&mut Spectrum> {
        self.machine.as_mut()
    }

    #[must_use]
    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut Breakpoints {
        &mut self.breakpoints
    }

    /// A handle for cross-thread pause/stop requests.
    #[must_use]
    pub fn control_handle(&self) -> ControlHandle {
        ControlHandle {
            signals: Arc::clone(&self.signals),
        }
    }

    /// Build the machine: `None → BuildingMachine → BeforeRun`.
    ///
    /// A no-op unless the controller is in the `None` state.
    ///
    /// # Errors
    ///
    /// Returns the machine construction error; the controller stays in
    /// `None` and can be retried with a fixed configuration.
    pub fn build(&mut self, config: &MachineConfig) -> Result<(), MachineError> {
        if self.state != MachineState::None {
            return Ok(());
        }
        let machine = Spectrum::new(config)?;
        self.transition(MachineState::BuildingMachine);
        self.machine = Some(machine);
        self.transition(MachineState::BeforeRun);
        Ok(())
    }

    /// Request a pause. Effective only while running; otherwise a no-op.
    pub fn pause(&self) {
        if self.state == MachineState::Running {
            self.signals.pause.store(true, Ordering::Release);
        }
    }

    /// Request a stop. From `Paused` the transition happens immediately;
    /// while running it takes effect at the next boundary; otherwise a
    /// no-op.
    pub fn stop(&mut self) {
        match self.state {
            MachineState::Running => self.signals.stop.store(true, Ordering::Release),
            MachineState::Paused => {
                self.transition(MachineState::Stopping);
                self.transition(MachineState::Stopped);
            }
            _ => {}
        }
    }

    /// Run the machine under the given options until a stop condition.
    ///
    /// Legal from `BeforeRun` and `Paused` (a resume); from any other
    /// state this is a no-op reporting `StopReason::Stopped`.
    pub fn run(&mut self, options: &ExecutionOptions) -> StopReason {
        match self.state {
            MachineState::BeforeRun => {}
            MachineState::Paused => self.transition(MachineState::BeforeRun),
            _ => return StopReason::Stopped,
        }
        if self.machine.is_none() {
            return StopReason::Stopped;
        }

        // Requests from before the run are stale
        self.signals.pause.store(false, Ordering::Release);
        self.signals.stop.store(false, Ordering::Release);
        self.transition(MachineState::Running);
        log::debug!("run loop entered: {:?}", options.mode);

        let started = Instant::now();
        let step_over = self.step_over_target(options);
        let mut executed: u64 = 0;
        let mut frames_paced: u64 = 0;

        loop {
            if self.signals.stop.swap(false, Ordering::AcqRel) {
                self.transition(MachineState::Stopping);
                self.transition(MachineState::Stopped);
                return StopReason::Stopped;
            }
            if self.signals.pause.swap(false, Ordering::AcqRel) {
                return self.pause_with(StopReason::Paused);
            }
            if let Some(timeout) = options.timeout
                && started.elapsed() >= timeout
            {
                log::warn!("run loop timed out after {executed} instructions");
                return self.pause_with(StopReason::Timeout);
            }

            // The machine is present for the whole loop; run() checked.
            let Some(machine) = self.machine.as_mut() else {
                return StopReason::Stopped;
            };

            if executed > 0
                && matches!(options.mode, ExecutionMode::Debugger { .. })
                && self.breakpoints.hit(machine.cpu().regs.pc)
            {
                return self.pause_with(StopReason::Breakpoint);
            }

            machine.step_instruction(&mut *self.events);
            executed += 1;

            match options.mode {
                ExecutionMode::Continuous => {}
                ExecutionMode::UntilHalt => {
                    if machine.cpu().is_halted() {
                        return self.pause_with(StopReason::Halted);
                    }
                }
                ExecutionMode::UntilExecutionPoint { address } => {
                    if machine.cpu().regs.pc == address {
                        return self.pause_with(StopReason::ExecutionPoint);
                    }
                }
                ExecutionMode::Debugger { step } => match (step, step_over) {
                    (StepMode::Into, _) | (StepMode::Over, None) => {
                        return self.pause_with(StopReason::StepCompleted);
                    }
                    (StepMode::Over, Some((target, entry_sp))) => {
                        let cpu = machine.cpu();
                        if cpu.regs.pc == target && cpu.regs.sp >= entry_sp {
                            return self.pause_with(StopReason::StepCompleted);
                        }
                    }
                    (StepMode::None, _) => {}
                },
            }

            if options.real_time {
                let frames = self.machine.as_ref().map_or(0, Spectrum::frame_count);
                if frames > frames_paced {
                    frames_paced = frames;
                    let target = started + FRAME_DURATION * frames_paced as u32;
                    let now = Instant::now();
                    if now < target {
                        std::thread::sleep(target - now);
                    }
                }
            }
        }
    }

    /// Pause transition pair with the given report.
    fn pause_with(&mut self, reason: StopReason) -> StopReason {
        self.transition(MachineState::Pausing);
        self.transition(MachineState::Paused);
        reason
    }

    /// For step-over: if the next instruction is a call (or RST), the step
    /// completes when PC returns to the following instruction with the
    /// stack back at the entry depth. `None` means step-into behaviour.
    fn step_over_target(&self, options: &ExecutionOptions) -> Option<(u16, u16)> {
        if !matches!(
            options.mode,
            ExecutionMode::Debugger {
                step: StepMode::Over
            }
        ) {
            return None;
        }
        let machine = self.machine.as_ref()?;
        let pc = machine.cpu().regs.pc;
        let bytes: Vec<u8> = (0..4)
            .map(|i| machine.bus().memory.peek(pc.wrapping_add(i)))
            .collect();
        let op = bytes[0];
        let is_call = op == 0xCD || (op & 0xC7) == 0xC4 || (op & 0xC7) == 0xC7;
        if !is_call {
            return None;
        }
        let length = disasm::disassemble(&bytes, pc).length;
        Some((pc.wrapping_add(length), machine.cpu().regs.sp))
    }

    /// Perform one lifecycle transition, notifying observers.
    fn transition(&mut self, to: MachineState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "illegal transition {:?} -> {to:?}",
            self.state
        );
        let old = self.state;
        self.state = to;
        log::debug!("machine state {old:?} -> {to:?}");
        self.events.state_changed(old, to);
    }
}
