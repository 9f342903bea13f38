//! Tape playback: blocks to EAR levels, keyed by the tact clock.
//!
//! The player holds the tact of the last signal edge and the length of the
//! pulse in progress. Querying it with the current tact walks as many pulse
//! boundaries as have elapsed and returns the level the line shows at that
//! moment, so the caller's query cadence never affects the waveform.

use crate::block::{SignalBlock, TapeBlock};

/// The pulse currently being emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Between blocks; the next boundary starts the next block.
    Idle,
    Pilot { remaining: u32 },
    Sync1,
    Sync2,
    Data {
        byte_idx: usize,
        bit_idx: u8,
        second_half: bool,
    },
    /// Trailing pause of a data block (level held low).
    BlockPause,
    Tone { remaining: u32 },
    PulseSeq { idx: usize },
    /// Explicit pause block.
    Pause,
    /// Stop-the-tape marker reached; waiting for `play()`.
    Stopped,
}

/// Tape playback state machine.
pub struct TapePlayer {
    blocks: Vec<SignalBlock>,
    /// Index one past the block currently playing.
    index: usize,
    phase: Phase,
    level: bool,
    /// Tact of the most recent signal edge.
    edge_tact: u64,
    /// Length of the pulse in progress; zero forces an immediate boundary.
    pulse_len: u64,
    playing: bool,
    completed: bool,
    load_completed_event: bool,
    loop_stack: Vec<(usize, u16)>,
    is_48k: bool,
}

impl TapePlayer {
    #[must_use]
    pub fn new(blocks: Vec<SignalBlock>, is_48k: bool) -> Self {
        Self {
            blocks,
            index: 0,
            phase: Phase::Idle,
            level: false,
            edge_tact: 0,
            pulse_len: 0,
            playing: false,
            completed: false,
            load_completed_event: false,
            loop_stack: Vec::new(),
            is_48k,
        }
    }

    /// Start (or resume) playback at the given tact.
    pub fn play(&mut self, tact: u64) {
        if self.playing || self.completed {
            return;
        }
        self.playing = true;
        self.edge_tact = tact;
        if self.phase == Phase::Stopped {
            self.phase = Phase::Idle;
            self.pulse_len = 0;
        }
        log::debug!("tape playback started at tact {tact}");
    }

    /// Pause playback; the phase is kept for a later `play()`.
    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Rewind to the first block.
    pub fn rewind(&mut self) {
        self.index = 0;
        self.phase = Phase::Idle;
        self.level = false;
        self.pulse_len = 0;
        self.playing = false;
        self.completed = false;
        self.loop_stack.clear();
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// All blocks consumed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.completed
    }

    /// Index of the block currently playing (0-based).
    #[must_use]
    pub fn block_index(&self) -> usize {
        self.index.saturating_sub(1)
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Latched load-completed signal; clears on read.
    pub fn take_load_completed(&mut self) -> bool {
        core::mem::take(&mut self.load_completed_event)
    }

    /// The EAR level at the given tact, advancing through any pulse
    /// boundaries that have elapsed since the last query.
    pub fn ear_bit(&mut self, tact: u64) -> bool {
        while self.playing && tact.saturating_sub(self.edge_tact) >= self.pulse_len {
            self.edge_tact += self.pulse_len;
            self.advance();
        }
        self.level
    }

    /// The block currently playing; only valid in the data-block phases.
    fn data_block(&self) -> &TapeBlock {
        match &self.blocks[self.index - 1] {
            SignalBlock::Data(block) => block,
            other => unreachable!("data phase outside a data block: {other:?}"),
        }
    }

    /// Cross one pulse boundary: emit the edge and set up the next pulse.
    fn advance(&mut self) {
        match self.phase {
            Phase::Idle => self.start_next_block(),

            Phase::Pilot { remaining } => {
                self.level = !self.level;
                if remaining > 1 {
                    self.phase = Phase::Pilot {
                        remaining: remaining - 1,
                    };
                    self.pulse_len = u64::from(self.data_block().pilot_pulse);
                } else {
                    self.phase = Phase::Sync1;
                    self.pulse_len = u64::from(self.data_block().sync1);
                }
            }

            Phase::Sync1 => {
                self.level = !self.level;
                self.phase = Phase::Sync2;
                self.pulse_len = u64::from(self.data_block().sync2);
            }

            Phase::Sync2 => {
                self.level = !self.level;
                self.enter_data();
            }

            Phase::Data {
                byte_idx,
                bit_idx,
                second_half,
            } => {
                self.level = !self.level;
                let block = self.data_block();
                let zero = u64::from(block.zero_pulse);
                let one = u64::from(block.one_pulse);
                let len = block.data.len();
                let used_bits = block.used_bits_last;
                let bit = (block.data[byte_idx] >> bit_idx) & 1;

                if !second_half {
                    // Same pulse length again for the second half-cycle
                    self.phase = Phase::Data {
                        byte_idx,
                        bit_idx,
                        second_half: true,
                    };
                    self.pulse_len = if bit == 1 { one } else { zero };
                    return;
                }

                if bit_idx > 0 {
                    self.set_data_bit(byte_idx, bit_idx - 1, zero, one);
                } else if byte_idx + 1 < len {
                    let last = byte_idx + 2 == len;
                    let first_bit = if last { used_bits - 1 } else { 7 };
                    self.set_data_bit(byte_idx + 1, first_bit, zero, one);
                } else {
                    self.enter_pause();
                }
            }

            Phase::BlockPause | Phase::Pause => {
                self.level = false;
                self.phase = Phase::Idle;
                self.pulse_len = 0;
            }

            Phase::Tone { remaining } => {
                self.level = !self.level;
                if remaining > 1 {
                    self.phase = Phase::Tone {
                        remaining: remaining - 1,
                    };
                    // pulse_len unchanged
                } else {
                    self.phase = Phase::Idle;
                    self.pulse_len = 0;
                }
            }

            Phase::PulseSeq { idx } => {
                self.level = !self.level;
                let next = idx + 1;
                let SignalBlock::Pulses(pulses) = &self.blocks[self.index - 1] else {
                    unreachable!("pulse phase outside a pulse block");
                };
                if next < pulses.len() {
                    self.pulse_len = u64::from(pulses[next]);
                    self.phase = Phase::PulseSeq { idx: next };
                } else {
                    self.phase = Phase::Idle;
                    self.pulse_len = 0;
                }
            }

            Phase::Stopped => {
                self.playing = false;
            }
        }
    }

    /// Start the data bits of the current block, or skip to the pause for
    /// an empty payload.
    fn enter_data(&mut self) {
        let block = self.data_block();
        if block.data.is_empty() {
            self.enter_pause();
            return;
        }
        let zero = u64::from(block.zero_pulse);
        let one = u64::from(block.one_pulse);
        let first_bit = if block.data.len() == 1 {
            block.used_bits_last - 1
        } else {
            7
        };
        self.set_data_bit(0, first_bit, zero, one);
    }

    fn set_data_bit(&mut self, byte_idx: usize, bit_idx: u8, zero: u64, one: u64) {
        let bit = (self.data_block().data[byte_idx] >> bit_idx) & 1;
        self.phase = Phase::Data {
            byte_idx,
            bit_idx,
            second_half: false,
        };
        self.pulse_len = if bit == 1 { one } else { zero };
    }

    /// Trailing pause of the current data block.
    fn enter_pause(&mut self) {
        let pause = self.data_block().pause_tacts;
        if pause > 0 {
            self.level = false;
            self.phase = Phase::BlockPause;
            self.pulse_len = pause;
        } else {
            self.phase = Phase::Idle;
            self.pulse_len = 0;
        }
    }

    /// Consume the next block from the list.
    fn start_next_block(&mut self) {
        if self.index >= self.blocks.len() {
            self.playing = false;
            self.level = false;
            self.pulse_len = 0;
            if !self.completed {
                self.completed = true;
                self.load_completed_event = true;
                log::debug!("tape playback completed");
            }
            return;
        }

        let block = self.blocks[self.index].clone();
        self.index += 1;

        match block {
            SignalBlock::Data(ref data) => {
                if data.pilot_count > 0 {
                    self.phase = Phase::Pilot {
                        remaining: data.pilot_count,
                    };
                    self.pulse_len = u64::from(data.pilot_pulse);
                } else if data.sync1 > 0 {
                    self.phase = Phase::Sync1;
                    self.pulse_len = u64::from(data.sync1);
                } else {
                    // Pure data: straight to the bits
                    self.enter_data();
                }
            }
            SignalBlock::Tone { pulse_len, count } => {
                if count == 0 || pulse_len == 0 {
                    self.phase = Phase::Idle;
                    self.pulse_len = 0;
                } else {
                    self.phase = Phase::Tone { remaining: count };
                    self.pulse_len = u64::from(pulse_len);
                }
            }
            SignalBlock::Pulses(ref pulses) => {
                if pulses.is_empty() {
                    self.phase = Phase::Idle;
                    self.pulse_len = 0;
                } else {
                    self.pulse_len = u64::from(pulses[0]);
                    self.phase = Phase::PulseSeq { idx: 0 };
                }
            }
            SignalBlock::Pause { tacts } => {
                self.level = false;
                self.phase = Phase::Pause;
                self.pulse_len = tacts;
            }
            SignalBlock::Stop => {
                self.playing = false;
                self.phase = Phase::Stopped;
                log::debug!("tape stopped by stop marker");
            }
            SignalBlock::StopIf48K => {
                if self.is_48k {
                    self.playing = false;
                    self.phase = Phase::Stopped;
                } else {
                    self.phase = Phase::Idle;
                    self.pulse_len = 0;
                }
            }
            SignalBlock::SetLevel(level) => {
                self.level = level;
                self.phase = Phase::Idle;
                self.pulse_len = 0;
            }
            SignalBlock::LoopStart { repetitions } => {
                self.loop_stack.push((self.index, repetitions));
                self.phase = Phase::Idle;
                self.pulse_len = 0;
            }
            SignalBlock::LoopEnd => {
                if let Some((start, remaining)) = self.loop_stack.pop()
                    && remaining > 1
                {
                    self.loop_stack.push((start, remaining - 1));
                    self.index = start;
                }
                self.phase = Phase::Idle;
                self.pulse_len = 0;
            }
        }
    }
}
