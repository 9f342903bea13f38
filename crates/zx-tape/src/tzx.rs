//! TZX container format.
//!
//! TZX stores the tape as typed blocks, each carrying its own pulse timing,
//! so non-ROM loaders and protection schemes survive the round trip to a
//! file. A 10-byte header (`"ZXTape!" + $1A + major + minor`) is followed
//! by blocks introduced by an ID byte.
//!
//! Since revision 1.10 every newly defined block starts with a 32-bit
//! length field, so an unknown ID is skipped by that declared length
//! instead of failing the parse.

use thiserror::Error;

use crate::block::{SignalBlock, TapeBlock};
use crate::pulse::ms_to_tacts;

const MAGIC: &[u8; 8] = b"ZXTape!\x1A";

/// TZX parse failure. Parsing is all-or-nothing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TzxError {
    #[error("TZX file too short for the 10-byte header")]
    HeaderTooShort,
    #[error("invalid TZX signature (expected \"ZXTape!\" + $1A)")]
    BadMagic,
    #[error("truncated TZX {context} at offset {offset}: need {needed} bytes, {remaining} remain")]
    Truncated {
        context: &'static str,
        offset: usize,
        needed: usize,
        remaining: usize,
    },
}

/// A parsed TZX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TzxFile {
    pub major: u8,
    pub minor: u8,
    pub blocks: Vec<TzxBlock>,
}

/// A single TZX block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TzxBlock {
    /// $10: standard speed data (implicit ROM timing).
    StandardSpeed { pause_ms: u16, data: Vec<u8> },
    /// $11: turbo speed data with explicit timing.
    TurboSpeed {
        pilot_pulse: u16,
        sync1: u16,
        sync2: u16,
        zero_pulse: u16,
        one_pulse: u16,
        pilot_count: u16,
        used_bits: u8,
        pause_ms: u16,
        data: Vec<u8>,
    },
    /// $12: pure tone.
    PureTone { pulse_len: u16, count: u16 },
    /// $13: explicit pulse sequence.
    PulseSequence { pulses: Vec<u16> },
    /// $14: data with no pilot or sync.
    PureData {
        zero_pulse: u16,
        one_pulse: u16,
        used_bits: u8,
        pause_ms: u16,
        data: Vec<u8>,
    },
    /// $20: pause, or stop the tape when the duration is zero.
    Pause { duration_ms: u16 },
    /// $21: group start (metadata).
    GroupStart { name: String },
    /// $22: group end.
    GroupEnd,
    /// $24: loop start.
    LoopStart { repetitions: u16 },
    /// $25: loop end.
    LoopEnd,
    /// $2A: stop the tape if in 48K mode.
    StopIf48K,
    /// $2B: set signal level.
    SetSignalLevel { level: bool },
    /// $30: text description (metadata).
    TextDescription { text: String },
    /// $32: archive info (metadata).
    ArchiveInfo { entries: Vec<(u8, String)> },
    /// Unknown ID, skipped via its declared length.
    Unknown { block_id: u8 },
}

impl TzxFile {
    /// Parse a TZX file from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`TzxError`] if the signature is wrong or a block is
    /// truncated. Unknown block IDs do not fail the parse.
    pub fn parse(data: &[u8]) -> Result<Self, TzxError> {
        if data.len() < 10 {
            return Err(TzxError::HeaderTooShort);
        }
        if &data[0..8] != MAGIC {
            return Err(TzxError::BadMagic);
        }

        let major = data[8];
        let minor = data[9];
        let mut blocks = Vec::new();
        let mut pos = 10;

        while pos < data.len() {
            let block_id = data[pos];
            pos += 1;

            let block = match block_id {
                0x10 => parse_standard_speed(data, &mut pos)?,
                0x11 => parse_turbo_speed(data, &mut pos)?,
                0x12 => parse_pure_tone(data, &mut pos)?,
                0x13 => parse_pulse_sequence(data, &mut pos)?,
                0x14 => parse_pure_data(data, &mut pos)?,
                0x20 => parse_pause(data, &mut pos)?,
                0x21 => parse_group_start(data, &mut pos)?,
                0x22 => TzxBlock::GroupEnd,
                0x24 => parse_loop_start(data, &mut pos)?,
                0x25 => TzxBlock::LoopEnd,
                0x2A => parse_stop_if_48k(data, &mut pos)?,
                0x2B => parse_set_signal_level(data, &mut pos)?,
                0x30 => parse_text_description(data, &mut pos)?,
                0x32 => parse_archive_info(data, &mut pos)?,
                _ => skip_unknown(block_id, data, &mut pos)?,
            };
            blocks.push(block);
        }

        log::debug!("parsed TZX v{major}.{minor}: {} blocks", blocks.len());
        Ok(Self {
            major,
            minor,
            blocks,
        })
    }

    /// Normalize into playback items.
    #[must_use]
    pub fn to_signal_blocks(&self) -> Vec<SignalBlock> {
        self.blocks.iter().filter_map(TzxBlock::to_signal).collect()
    }
}

impl TzxBlock {
    /// The playback item for this block; metadata blocks have none.
    #[must_use]
    pub fn to_signal(&self) -> Option<SignalBlock> {
        match self {
            Self::StandardSpeed { pause_ms, data } => Some(SignalBlock::Data(TapeBlock::standard(
                data.clone(),
                ms_to_tacts(u32::from(*pause_ms)),
            ))),
            Self::TurboSpeed {
                pilot_pulse,
                sync1,
                sync2,
                zero_pulse,
                one_pulse,
                pilot_count,
                used_bits,
                pause_ms,
                data,
            } => Some(SignalBlock::Data(TapeBlock {
                pilot_pulse: u32::from(*pilot_pulse),
                pilot_count: u32::from(*pilot_count),
                sync1: u32::from(*sync1),
                sync2: u32::from(*sync2),
                zero_pulse: u32::from(*zero_pulse),
                one_pulse: u32::from(*one_pulse),
                used_bits_last: if *used_bits == 0 { 8 } else { *used_bits },
                data: data.clone(),
                pause_tacts: ms_to_tacts(u32::from(*pause_ms)),
            })),
            Self::PureTone { pulse_len, count } => Some(SignalBlock::Tone {
                pulse_len: u32::from(*pulse_len),
                count: u32::from(*count),
            }),
            Self::PulseSequence { pulses } => Some(SignalBlock::Pulses(pulses.clone())),
            Self::PureData {
                zero_pulse,
                one_pulse,
                used_bits,
                pause_ms,
                data,
            } => Some(SignalBlock::Data(TapeBlock {
                pilot_pulse: 0,
                pilot_count: 0,
                sync1: 0,
                sync2: 0,
                zero_pulse: u32::from(*zero_pulse),
                one_pulse: u32::from(*one_pulse),
                used_bits_last: if *used_bits == 0 { 8 } else { *used_bits },
                data: data.clone(),
                pause_tacts: ms_to_tacts(u32::from(*pause_ms)),
            })),
            Self::Pause { duration_ms: 0 } => Some(SignalBlock::Stop),
            Self::Pause { duration_ms } => Some(SignalBlock::Pause {
                tacts: ms_to_tacts(u32::from(*duration_ms)),
            }),
            Self::LoopStart { repetitions } => Some(SignalBlock::LoopStart {
                repetitions: *repetitions,
            }),
            Self::LoopEnd => Some(SignalBlock::LoopEnd),
            Self::StopIf48K => Some(SignalBlock::StopIf48K),
            Self::SetSignalLevel { level } => Some(SignalBlock::SetLevel(*level)),
            Self::GroupStart { .. }
            | Self::GroupEnd
            | Self::TextDescription { .. }
            | Self::ArchiveInfo { .. }
            | Self::Unknown { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn need(
    data: &[u8],
    pos: usize,
    n: usize,
    context: &'static str,
) -> Result<(), TzxError> {
    if pos + n > data.len() {
        Err(TzxError::Truncated {
            context,
            offset: pos,
            needed: n,
            remaining: data.len() - pos,
        })
    } else {
        Ok(())
    }
}

fn read_u16_le(data: &[u8], pos: usize) -> u16 {
    u16::from(data[pos]) | (u16::from(data[pos + 1]) << 8)
}

fn read_u24_le(data: &[u8], pos: usize) -> u32 {
    u32::from(data[pos]) | (u32::from(data[pos + 1]) << 8) | (u32::from(data[pos + 2]) << 16)
}

fn read_u32_le(data: &[u8], pos: usize) -> u32 {
    read_u24_le(data, pos) | (u32::from(data[pos + 3]) << 24)
}

// ---------------------------------------------------------------------------
// Block parsers
// ---------------------------------------------------------------------------

fn parse_standard_speed(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    need(data, *pos, 4, "standard speed header")?;
    let pause_ms = read_u16_le(data, *pos);
    let data_len = read_u16_le(data, *pos + 2) as usize;
    *pos += 4;

    need(data, *pos, data_len, "standard speed data")?;
    let block_data = data[*pos..*pos + data_len].to_vec();
    *pos += data_len;

    Ok(TzxBlock::StandardSpeed {
        pause_ms,
        data: block_data,
    })
}

fn parse_turbo_speed(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    need(data, *pos, 18, "turbo speed header")?;
    let pilot_pulse = read_u16_le(data, *pos);
    let sync1 = read_u16_le(data, *pos + 2);
    let sync2 = read_u16_le(data, *pos + 4);
    let zero_pulse = read_u16_le(data, *pos + 6);
    let one_pulse = read_u16_le(data, *pos + 8);
    let pilot_count = read_u16_le(data, *pos + 10);
    let used_bits = data[*pos + 12];
    let pause_ms = read_u16_le(data, *pos + 13);
    let data_len = read_u24_le(data, *pos + 15) as usize;
    *pos += 18;

    need(data, *pos, data_len, "turbo speed data")?;
    let block_data = data[*pos..*pos + data_len].to_vec();
    *pos += data_len;

    Ok(TzxBlock::TurboSpeed {
        pilot_pulse,
        sync1,
        sync2,
        zero_pulse,
        one_pulse,
        pilot_count,
        used_bits,
        pause_ms,
        data: block_data,
    })
}

fn parse_pure_tone(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    need(data, *pos, 4, "pure tone")?;
    let pulse_len = read_u16_le(data, *pos);
    let count = read_u16_le(data, *pos + 2);
    *pos += 4;
    Ok(TzxBlock::PureTone { pulse_len, count })
}

fn parse_pulse_sequence(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    need(data, *pos, 1, "pulse sequence count")?;
    let count = data[*pos] as usize;
    *pos += 1;

    need(data, *pos, count * 2, "pulse sequence data")?;
    let pulses = (0..count)
        .map(|i| read_u16_le(data, *pos + i * 2))
        .collect();
    *pos += count * 2;

    Ok(TzxBlock::PulseSequence { pulses })
}

fn parse_pure_data(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    need(data, *pos, 10, "pure data header")?;
    let zero_pulse = read_u16_le(data, *pos);
    let one_pulse = read_u16_le(data, *pos + 2);
    let used_bits = data[*pos + 4];
    let pause_ms = read_u16_le(data, *pos + 5);
    let data_len = read_u24_le(data, *pos + 7) as usize;
    *pos += 10;

    need(data, *pos, data_len, "pure data data")?;
    let block_data = data[*pos..*pos + data_len].to_vec();
    *pos += data_len;

    Ok(TzxBlock::PureData {
        zero_pulse,
        one_pulse,
        used_bits,
        pause_ms,
        data: block_data,
    })
}

fn parse_pause(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    need(data, *pos, 2, "pause")?;
    let duration_ms = read_u16_le(data, *pos);
    *pos += 2;
    Ok(TzxBlock::Pause { duration_ms })
}

fn parse_group_start(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    need(data, *pos, 1, "group start length")?;
    let len = data[*pos] as usize;
    *pos += 1;

    need(data, *pos, len, "group start name")?;
    let name = String::from_utf8_lossy(&data[*pos..*pos + len]).to_string();
    *pos += len;

    Ok(TzxBlock::GroupStart { name })
}

fn parse_loop_start(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    need(data, *pos, 2, "loop start")?;
    let repetitions = read_u16_le(data, *pos);
    *pos += 2;
    Ok(TzxBlock::LoopStart { repetitions })
}

fn parse_stop_if_48k(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    // 4-byte declared length, always zero for this block
    need(data, *pos, 4, "stop if 48K")?;
    *pos += 4;
    Ok(TzxBlock::StopIf48K)
}

fn parse_set_signal_level(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    // 4-byte declared length (always 1) + level byte
    need(data, *pos, 5, "set signal level")?;
    let level = data[*pos + 4] != 0;
    *pos += 5;
    Ok(TzxBlock::SetSignalLevel { level })
}

fn parse_text_description(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    need(data, *pos, 1, "text description length")?;
    let len = data[*pos] as usize;
    *pos += 1;

    need(data, *pos, len, "text description")?;
    let text = String::from_utf8_lossy(&data[*pos..*pos + len]).to_string();
    *pos += len;

    Ok(TzxBlock::TextDescription { text })
}

fn parse_archive_info(data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    need(data, *pos, 3, "archive info header")?;
    let total_len = read_u16_le(data, *pos) as usize;
    let end = *pos + 2 + total_len;
    let count = data[*pos + 2] as usize;
    *pos += 3;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        need(data, *pos, 2, "archive info entry")?;
        let id = data[*pos];
        let len = data[*pos + 1] as usize;
        *pos += 2;

        need(data, *pos, len, "archive info text")?;
        let text = String::from_utf8_lossy(&data[*pos..*pos + len]).to_string();
        *pos += len;
        entries.push((id, text));
    }

    // The declared total length wins if the entries were undersized
    *pos = (*pos).max(end).min(data.len());
    Ok(TzxBlock::ArchiveInfo { entries })
}

/// Skip an unrecognized block by its declared 32-bit length (the TZX 1.10
/// extension rule).
fn skip_unknown(block_id: u8, data: &[u8], pos: &mut usize) -> Result<TzxBlock, TzxError> {
    need(data, *pos, 4, "unknown block length")?;
    let len = read_u32_le(data, *pos) as usize;
    *pos += 4;

    need(data, *pos, len, "unknown block body")?;
    *pos += len;

    log::warn!("skipping unknown TZX block ${block_id:02X} ({len} bytes)");
    Ok(TzxBlock::Unknown { block_id })
}
