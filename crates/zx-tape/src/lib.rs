//! Tape containers and the pulse-level codec.
//!
//! Two complementary state machines share one pulse-duration vocabulary:
//! [`TapePlayer`] turns parsed blocks into EAR levels keyed by the tact
//! clock, and [`TapeRecorder`] turns MIC edge timestamps back into blocks.
//! The TAP and TZX containers both normalize into [`SignalBlock`]s for
//! playback.

pub mod block;
pub mod player;
pub mod pulse;
pub mod recorder;
pub mod tap;
pub mod tzx;

pub use block::{SignalBlock, TapeBlock};
pub use player::TapePlayer;
pub use recorder::TapeRecorder;
pub use tap::{TapBlock, TapError, TapFile};
pub use tzx::{TzxBlock, TzxError, TzxFile};
