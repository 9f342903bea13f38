//! The pulse-duration vocabulary shared by playback and recording.
//!
//! All lengths are in tacts of the 3.5 MHz CPU clock, matching the timing
//! the 48K ROM routines generate and accept.

/// Pilot pulse length.
pub const PILOT_PULSE: u32 = 2168;

/// First sync pulse length.
pub const SYNC1_PULSE: u32 = 667;

/// Second sync pulse length.
pub const SYNC2_PULSE: u32 = 735;

/// Zero-bit pulse length (two pulses per bit).
pub const ZERO_PULSE: u32 = 855;

/// One-bit pulse length (two pulses per bit).
pub const ONE_PULSE: u32 = 1710;

/// Pilot pulses before a header block (flag byte $00).
pub const HEADER_PILOT_COUNT: u32 = 8063;

/// Pilot pulses before a data block (flag byte $FF).
pub const DATA_PILOT_COUNT: u32 = 3223;

/// Default pause after a block: one second of tape.
pub const BLOCK_PAUSE_TACTS: u64 = CPU_FREQ as u64;

/// CPU clock frequency used for ms→tact conversion.
pub const CPU_FREQ: u32 = 3_500_000;

/// Classification tolerance as a percentage of the nominal pulse length.
pub const TOLERANCE_PERCENT: u32 = 20;

/// An edge gap at least this long means the line went idle. Longer than any
/// pulse the vocabulary knows, shorter than any real inter-block pause.
pub const IDLE_GAP_TACTS: u64 = 10_000;

/// Pilot pulses the recorder must see before it honours a sync pulse.
/// Real SAVEs emit thousands; a handful rejects line noise.
pub const MIN_PILOT_RUN: u32 = 16;

/// The pulse categories a recorded interval can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseKind {
    Pilot,
    Sync1,
    Sync2,
    Zero,
    One,
}

impl PulseKind {
    /// Nominal length in tacts.
    #[must_use]
    pub const fn nominal(self) -> u32 {
        match self {
            Self::Pilot => PILOT_PULSE,
            Self::Sync1 => SYNC1_PULSE,
            Self::Sync2 => SYNC2_PULSE,
            Self::Zero => ZERO_PULSE,
            Self::One => ONE_PULSE,
        }
    }
}

/// Is `interval` within tolerance of `nominal`?
#[must_use]
pub fn within_tolerance(interval: u64, nominal: u32) -> bool {
    let margin = u64::from(nominal) * u64::from(TOLERANCE_PERCENT) / 100;
    let nominal = u64::from(nominal);
    interval + margin >= nominal && interval <= nominal + margin
}

/// Classify an interval against a set of candidate kinds.
///
/// The tolerance windows of neighbouring kinds overlap (sync-2 reaches into
/// zero territory, a slow one-pulse into pilot territory), so classification
/// is always against what the state machine currently expects, taking the
/// nearest nominal among the in-tolerance candidates.
#[must_use]
pub fn classify(interval: u64, candidates: &[PulseKind]) -> Option<PulseKind> {
    candidates
        .iter()
        .copied()
        .filter(|kind| within_tolerance(interval, kind.nominal()))
        .min_by_key(|kind| u64::from(kind.nominal()).abs_diff(interval))
}

/// Milliseconds of pause converted to tacts.
#[must_use]
pub fn ms_to_tacts(ms: u32) -> u64 {
    u64::from(ms) * u64::from(CPU_FREQ) / 1000
}
