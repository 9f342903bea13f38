//! TAP container format.
//!
//! The simplest Spectrum tape container: sequential blocks, each preceded
//! by a 2-byte little-endian length. A block is flag byte, payload, and an
//! XOR checksum over both. Pulse timing is implicit — every block plays
//! with the standard ROM timing.

use thiserror::Error;

use crate::block::{SignalBlock, TapeBlock};
use crate::pulse::BLOCK_PAUSE_TACTS;

/// TAP parse failure. Parsing is all-or-nothing: an error leaves no
/// partially loaded state behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TapError {
    #[error("truncated TAP file: need {needed} bytes at offset {offset}, {remaining} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("TAP block at offset {offset} has length {length}, minimum is 2 (flag + checksum)")]
    BlockTooShort { offset: usize, length: usize },
    #[error(
        "TAP block at offset {offset}: checksum mismatch (expected ${expected:02X}, got ${found:02X})"
    )]
    ChecksumMismatch {
        offset: usize,
        expected: u8,
        found: u8,
    },
}

/// A single TAP block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapBlock {
    /// Flag byte: $00 = header, $FF = data.
    pub flag: u8,
    /// Payload, excluding flag and checksum.
    pub data: Vec<u8>,
}

impl TapBlock {
    /// The bytes as they appear on the wire: flag, payload, checksum.
    #[must_use]
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() + 2);
        bytes.push(self.flag);
        bytes.extend_from_slice(&self.data);
        bytes.push(self.checksum());
        bytes
    }

    /// XOR of flag and payload.
    #[must_use]
    pub fn checksum(&self) -> u8 {
        self.data.iter().fold(self.flag, |acc, &b| acc ^ b)
    }
}

/// A parsed TAP file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapFile {
    pub blocks: Vec<TapBlock>,
}

impl TapFile {
    /// Parse a TAP file from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`TapError`] for truncation, an undersized block length,
    /// or a checksum mismatch.
    pub fn parse(data: &[u8]) -> Result<Self, TapError> {
        let mut blocks = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            if offset + 2 > data.len() {
                return Err(TapError::Truncated {
                    offset,
                    needed: 2,
                    remaining: data.len() - offset,
                });
            }
            let length =
                usize::from(u16::from(data[offset]) | (u16::from(data[offset + 1]) << 8));
            let block_start = offset;
            offset += 2;

            if length < 2 {
                return Err(TapError::BlockTooShort {
                    offset: block_start,
                    length,
                });
            }
            if offset + length > data.len() {
                return Err(TapError::Truncated {
                    offset: block_start,
                    needed: length,
                    remaining: data.len() - offset,
                });
            }

            let flag = data[offset];
            let payload = &data[offset + 1..offset + length - 1];
            let found = data[offset + length - 1];
            let block = TapBlock {
                flag,
                data: payload.to_vec(),
            };
            let expected = block.checksum();
            if expected != found {
                return Err(TapError::ChecksumMismatch {
                    offset: block_start,
                    expected,
                    found,
                });
            }

            blocks.push(block);
            offset += length;
        }

        log::debug!("parsed TAP: {} blocks", blocks.len());
        Ok(Self { blocks })
    }

    /// Serialize back to TAP bytes (used to persist recorded blocks).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for block in &self.blocks {
            let wire = block.wire_bytes();
            out.push(wire.len() as u8);
            out.push((wire.len() >> 8) as u8);
            out.extend_from_slice(&wire);
        }
        out
    }

    /// Build a TAP file from recorded timing blocks. The recorder produces
    /// wire bytes (flag + payload + checksum) in `TapeBlock::data`.
    #[must_use]
    pub fn from_tape_blocks(blocks: &[TapeBlock]) -> Self {
        let tap_blocks = blocks
            .iter()
            .filter(|b| b.data.len() >= 2)
            .map(|b| TapBlock {
                flag: b.data[0],
                data: b.data[1..b.data.len() - 1].to_vec(),
            })
            .collect();
        Self {
            blocks: tap_blocks,
        }
    }

    /// Normalize into playback items: each block with standard timing and
    /// the standard one-second trailing pause.
    #[must_use]
    pub fn to_signal_blocks(&self) -> Vec<SignalBlock> {
        self.blocks
            .iter()
            .map(|block| {
                SignalBlock::Data(TapeBlock::standard(block.wire_bytes(), BLOCK_PAUSE_TACTS))
            })
            .collect()
    }
}
