//! Execution options and stop reasons.

use std::time::Duration;

/// Debugger stepping behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    /// Run until a breakpoint or cancellation.
    #[default]
    None,
    /// Exactly one instruction.
    Into,
    /// One instruction, but run calls to completion (same stack depth).
    Over,
}

/// What the run loop is trying to achieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Run until cancelled.
    #[default]
    Continuous,
    /// Stop when the CPU halts.
    UntilHalt,
    /// Stop when PC reaches the given address.
    UntilExecutionPoint { address: u16 },
    /// Breakpoints and stepping are honoured.
    Debugger { step: StepMode },
}

/// Immutable description of one run. Built once, passed to
/// [`crate::ExecutionController::run`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub mode: ExecutionMode,
    /// Cancel the run and report [`StopReason::Timeout`] once this much
    /// wall-clock time has elapsed.
    pub timeout: Option<Duration>,
    /// Sleep between frames so emulated time tracks wall-clock time.
    pub real_time: bool,
}

impl ExecutionOptions {
    #[must_use]
    pub fn continuous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn until_halt() -> Self {
        Self {
            mode: ExecutionMode::UntilHalt,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn until_execution_point(address: u16) -> Self {
        Self {
            mode: ExecutionMode::UntilExecutionPoint { address },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn debugger(step: StepMode) -> Self {
        Self {
            mode: ExecutionMode::Debugger { step },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Why the run loop returned. Distinguishes "the user asked" from "the
/// machine reached a condition" from "the machine is stuck".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A pause request took effect.
    Paused,
    /// A stop request took effect; the machine is terminal.
    Stopped,
    /// Debugger mode hit a breakpoint.
    Breakpoint,
    /// The configured execution point was reached.
    ExecutionPoint,
    /// The CPU entered its halted state (until-halt mode).
    Halted,
    /// A debugger step completed.
    StepCompleted,
    /// The wall-clock timeout expired.
    Timeout,
}
