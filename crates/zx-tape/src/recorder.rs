//! Tape recording: MIC edge timestamps back into blocks.
//!
//! Each inter-edge interval is classified against the pulse vocabulary in
//! the context the state machine currently expects: pilot pulses accumulate
//! a count, the sync pair arms the bit decoder, and zero/one intervals (two
//! per bit, MSB first) rebuild bytes. An interval outside every expected
//! category abandons the current block and rescans for pilot; an idle-length
//! gap finalizes the block.

use crate::block::TapeBlock;
use crate::pulse::{
    BLOCK_PAUSE_TACTS, IDLE_GAP_TACTS, MIN_PILOT_RUN, PulseKind, classify,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordPhase {
    /// Scanning for the first pilot-length interval.
    Idle,
    /// Counting pilot pulses.
    Pilot,
    /// Sync-1 seen; the next interval must be sync-2.
    AwaitSync2,
    /// Decoding data bits.
    Data,
}

/// Tape recording state machine.
pub struct TapeRecorder {
    phase: RecordPhase,
    /// Current MIC level.
    mic: bool,
    /// Tact of the last MIC transition.
    last_edge: u64,

    pilot_count: u32,
    bytes: Vec<u8>,
    current_byte: u8,
    bit_count: u8,
    /// First half of a bit, waiting for its matching second pulse.
    pending_half: Option<PulseKind>,

    /// Finalized blocks, in recording order.
    blocks: Vec<TapeBlock>,
    /// Save mode: between the first pilot edge and finalization.
    recording: bool,
    save_entered_event: bool,
    save_left_event: bool,
}

impl TapeRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: RecordPhase::Idle,
            mic: false,
            last_edge: 0,
            pilot_count: 0,
            bytes: Vec::new(),
            current_byte: 0,
            bit_count: 0,
            pending_half: None,
            blocks: Vec::new(),
            recording: false,
            save_entered_event: false,
            save_left_event: false,
        }
    }

    /// Feed the MIC level at the given tact. Only transitions matter; a
    /// repeated level is ignored.
    pub fn mic_bit(&mut self, tact: u64, level: bool) {
        if level == self.mic {
            return;
        }
        let interval = tact.saturating_sub(self.last_edge);
        self.mic = level;
        self.last_edge = tact;
        self.edge(interval);
    }

    /// Idle detection without an edge: finalize the block in progress if
    /// the line has been quiet for longer than any legal pulse. Called
    /// periodically (per frame) by the machine.
    pub fn flush(&mut self, tact: u64) {
        if self.recording && tact.saturating_sub(self.last_edge) >= IDLE_GAP_TACTS {
            self.finalize();
        }
    }

    /// Finalized blocks recorded so far.
    #[must_use]
    pub fn blocks(&self) -> &[TapeBlock] {
        &self.blocks
    }

    /// Hand over the recorded blocks, leaving the recorder empty.
    pub fn take_blocks(&mut self) -> Vec<TapeBlock> {
        core::mem::take(&mut self.blocks)
    }

    /// In save mode (a block is being received)?
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Latched entered-save-mode signal; clears on read.
    pub fn take_save_entered(&mut self) -> bool {
        core::mem::take(&mut self.save_entered_event)
    }

    /// Latched left-save-mode signal; clears on read.
    pub fn take_save_left(&mut self) -> bool {
        core::mem::take(&mut self.save_left_event)
    }

    /// Classify one inter-edge interval.
    fn edge(&mut self, interval: u64) {
        if interval >= IDLE_GAP_TACTS {
            if self.recording {
                self.finalize();
            }
            return;
        }

        match self.phase {
            RecordPhase::Idle => {
                if classify(interval, &[PulseKind::Pilot]).is_some() {
                    self.enter_pilot();
                }
            }

            RecordPhase::Pilot => {
                match classify(interval, &[PulseKind::Pilot, PulseKind::Sync1]) {
                    Some(PulseKind::Pilot) => self.pilot_count += 1,
                    Some(PulseKind::Sync1) if self.pilot_count >= MIN_PILOT_RUN => {
                        self.phase = RecordPhase::AwaitSync2;
                    }
                    _ => self.resync(interval),
                }
            }

            RecordPhase::AwaitSync2 => {
                if classify(interval, &[PulseKind::Sync2]).is_some() {
                    self.phase = RecordPhase::Data;
                    self.bytes.clear();
                    self.current_byte = 0;
                    self.bit_count = 0;
                    self.pending_half = None;
                } else {
                    self.resync(interval);
                }
            }

            RecordPhase::Data => {
                match classify(interval, &[PulseKind::Zero, PulseKind::One]) {
                    Some(kind) => match self.pending_half {
                        None => self.pending_half = Some(kind),
                        Some(first) if first == kind => {
                            self.pending_half = None;
                            self.push_bit(kind == PulseKind::One);
                        }
                        Some(_) => {
                            // Mismatched half-pulses: the block is garbage
                            log::warn!(
                                "tape record: mismatched bit halves, abandoning block"
                            );
                            self.abandon();
                            self.resync(interval);
                        }
                    },
                    None => {
                        log::warn!(
                            "tape record: interval of {interval} tacts fits no pulse, abandoning block"
                        );
                        self.abandon();
                        self.resync(interval);
                    }
                }
            }
        }
    }

    /// A bit decoded, MSB first.
    fn push_bit(&mut self, one: bool) {
        self.current_byte = (self.current_byte << 1) | u8::from(one);
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.bytes.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    fn enter_pilot(&mut self) {
        self.phase = RecordPhase::Pilot;
        self.pilot_count = 1;
        if !self.recording {
            self.recording = true;
            self.save_entered_event = true;
            log::debug!("tape record: save mode entered");
        }
    }

    /// After an abort or failed sync: the offending interval may itself be
    /// the first pulse of a new pilot run.
    fn resync(&mut self, interval: u64) {
        if classify(interval, &[PulseKind::Pilot]).is_some() {
            self.enter_pilot();
        } else {
            self.phase = RecordPhase::Idle;
        }
    }

    /// Drop the block in progress without finalizing.
    fn abandon(&mut self) {
        self.bytes.clear();
        self.current_byte = 0;
        self.bit_count = 0;
        self.pending_half = None;
        self.phase = RecordPhase::Idle;
    }

    /// The line went idle: freeze the block in progress (complete bytes
    /// only) and append it to the output sequence.
    fn finalize(&mut self) {
        if self.phase == RecordPhase::Data {
            let data = core::mem::take(&mut self.bytes);
            let mut block = TapeBlock::standard(data, BLOCK_PAUSE_TACTS);
            block.pilot_count = self.pilot_count;
            log::debug!(
                "tape record: block finalized, {} bytes after {} pilot pulses",
                block.data.len(),
                block.pilot_count
            );
            self.blocks.push(block);
        }
        self.abandon();
        self.pilot_count = 0;
        self.recording = false;
        self.save_left_event = true;
    }
}

impl Default for TapeRecorder {
    fn default() -> Self {
        Self::new()
    }
}
