//! Core traits and types for the Spectrum emulation core.
//!
//! Everything is timed in tacts of the CPU clock. The CPU owns the tact
//! counter and advances it; every other device reads it. No exceptions.

mod bus;
mod events;
mod state;
mod tacts;

pub use bus::Bus;
pub use events::{FrameSnapshot, MachineEvents, NullEvents};
pub use state::MachineState;
pub use tacts::Tacts;
