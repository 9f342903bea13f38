//! Observer interfaces for machine collaborators.
//!
//! Collaborators (debugger panels, renderers, audio sinks) receive
//! notifications through an explicit trait passed at construction. Events
//! fire only between instructions or at frame boundaries, never from inside
//! instruction execution, so observers always see committed state.

use crate::MachineState;

/// Read-only snapshot of one completed frame, handed to collaborators.
///
/// Borrows are valid only for the duration of the callback; the core reuses
/// the underlying buffers for the next frame.
pub struct FrameSnapshot<'a> {
    /// Completed frame index (first frame is 0).
    pub frame: u64,
    /// Tact at which the frame boundary was crossed.
    pub tact: u64,
    /// Screen memory (bitmap + attributes, 6912 bytes).
    pub screen: &'a [u8],
    /// Border colour (0-7).
    pub border: u8,
    /// Speaker level samples accumulated during the frame.
    pub audio: &'a [f32],
}

/// Notifications emitted by the execution controller and tape codec.
///
/// All methods default to no-ops so observers implement only what they need.
pub trait MachineEvents {
    /// The controller moved from `old` to `new`. Fired on every transition,
    /// including the transient `Pausing`/`Stopping` states.
    fn state_changed(&mut self, old: MachineState, new: MachineState) {
        let _ = (old, new);
    }

    /// A frame finished; the snapshot is valid for this call only.
    fn frame_completed(&mut self, frame: &FrameSnapshot<'_>) {
        let _ = frame;
    }

    /// Tape playback consumed the final block.
    fn load_completed(&mut self) {}

    /// The tape recorder saw the first pilot edge of a SAVE.
    fn save_mode_entered(&mut self) {}

    /// The tape recorder finalized a block and returned to idle.
    fn save_mode_left(&mut self) {}
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEvents;

impl MachineEvents for NullEvents {}
