//! Normalized tape timing records.
//!
//! Containers parse into their own shapes; playback runs off these.

use crate::pulse::{
    BLOCK_PAUSE_TACTS, DATA_PILOT_COUNT, HEADER_PILOT_COUNT, ONE_PULSE, PILOT_PULSE, SYNC1_PULSE,
    SYNC2_PULSE, ZERO_PULSE,
};

/// One data-carrying tape block with its complete pulse timing.
///
/// Immutable during playback; the recorder builds one incrementally and
/// freezes it when the line goes idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeBlock {
    /// Pilot pulse length in tacts.
    pub pilot_pulse: u32,
    /// Number of pilot pulses.
    pub pilot_count: u32,
    /// First sync pulse length.
    pub sync1: u32,
    /// Second sync pulse length.
    pub sync2: u32,
    /// Zero-bit pulse length (each bit is two pulses).
    pub zero_pulse: u32,
    /// One-bit pulse length.
    pub one_pulse: u32,
    /// Bits transmitted from the final byte, 1-8.
    pub used_bits_last: u8,
    /// Payload: flag byte, data and checksum as they appear on tape.
    pub data: Vec<u8>,
    /// Trailing pause in tacts.
    pub pause_tacts: u64,
}

impl TapeBlock {
    /// A block with standard ROM timing. The pilot count depends on the
    /// flag byte: headers get the long pilot, data blocks the short one.
    #[must_use]
    pub fn standard(data: Vec<u8>, pause_tacts: u64) -> Self {
        let pilot_count = if data.first() == Some(&0x00) {
            HEADER_PILOT_COUNT
        } else {
            DATA_PILOT_COUNT
        };
        Self {
            pilot_pulse: PILOT_PULSE,
            pilot_count,
            sync1: SYNC1_PULSE,
            sync2: SYNC2_PULSE,
            zero_pulse: ZERO_PULSE,
            one_pulse: ONE_PULSE,
            used_bits_last: 8,
            data,
            pause_tacts,
        }
    }

    /// Total number of bits on the wire.
    #[must_use]
    pub fn bit_count(&self) -> u64 {
        match self.data.len() {
            0 => 0,
            n => (n as u64 - 1) * 8 + u64::from(self.used_bits_last),
        }
    }

    /// Total number of edges this block produces (without the pause).
    #[must_use]
    pub fn pulse_count(&self) -> u64 {
        u64::from(self.pilot_count) + 2 + self.bit_count() * 2
    }
}

impl Default for TapeBlock {
    fn default() -> Self {
        Self::standard(Vec::new(), BLOCK_PAUSE_TACTS)
    }
}

/// One playback item: a data block or a TZX control element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalBlock {
    /// Pilot/sync/data/pause, the standard shape.
    Data(TapeBlock),
    /// A run of identical pulses with no sync or data.
    Tone { pulse_len: u32, count: u32 },
    /// An explicit pulse-length sequence.
    Pulses(Vec<u16>),
    /// Silence with the EAR line held low.
    Pause { tacts: u64 },
    /// Stop the tape and wait for the user to press play again.
    Stop,
    /// Stop the tape only on a 48K machine.
    StopIf48K,
    /// Force the EAR level.
    SetLevel(bool),
    /// Repeat the blocks up to the matching `LoopEnd`.
    LoopStart { repetitions: u16 },
    LoopEnd,
}
