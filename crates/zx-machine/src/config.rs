//! Machine configuration.

use thiserror::Error;

/// Supported machine models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineModel {
    Spectrum48K,
    Spectrum128K,
}

/// Configuration for building a machine instance. Resolved once at
/// construction; nothing here is consulted afterwards.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub model: MachineModel,
    /// ROM image: 16K for the 48K model, 32K (two banks) for the 128K.
    pub rom: Vec<u8>,
}

/// Machine construction failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MachineError {
    #[error("ROM image must be {expected} bytes for this model, got {got}")]
    BadRomSize { expected: usize, got: usize },
}

impl MachineConfig {
    /// A 48K machine with the given ROM.
    #[must_use]
    pub fn spectrum_48k(rom: Vec<u8>) -> Self {
        Self {
            model: MachineModel::Spectrum48K,
            rom,
        }
    }

    /// A 128K machine with the given 32K ROM.
    #[must_use]
    pub fn spectrum_128k(rom: Vec<u8>) -> Self {
        Self {
            model: MachineModel::Spectrum128K,
            rom,
        }
    }
}
