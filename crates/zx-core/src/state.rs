//! Machine lifecycle state.

/// Execution-controller lifecycle state.
///
/// Transitions are strictly one-directional:
///
/// ```text
/// None --build--> BuildingMachine --init--> BeforeRun --go--> Running
/// Running --pause--> Pausing --ack--> Paused --resume--> BeforeRun
/// Running|Paused --stop--> Stopping --ack--> Stopped
/// ```
///
/// `Stopped` is terminal for a machine instance; a new instance must be
/// built to run again. Requests that have no edge from the current state
/// (pausing a `Stopped` machine, say) are no-ops, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MachineState {
    /// No machine has been built yet.
    #[default]
    None,
    /// The machine is being constructed.
    BuildingMachine,
    /// Built and ready to run (also the state after a resume).
    BeforeRun,
    /// The run loop is executing instructions.
    Running,
    /// A pause was requested; waiting for the instruction boundary.
    Pausing,
    /// Paused at an instruction boundary; can resume.
    Paused,
    /// A stop was requested; waiting for the instruction boundary.
    Stopping,
    /// Terminal state. The instance cannot be restarted.
    Stopped,
}

impl MachineState {
    /// Is the transition `self -> to` one of the legal edges?
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        use MachineState::{
            BeforeRun, BuildingMachine, None, Paused, Pausing, Running, Stopped, Stopping,
        };
        matches!(
            (self, to),
            (None, BuildingMachine)
                | (BuildingMachine, BeforeRun)
                | (BeforeRun, Running)
                | (Running, Pausing)
                | (Pausing, Paused)
                | (Paused, BeforeRun)
                | (Running | Paused, Stopping)
                | (Stopping, Stopped)
        )
    }
}
