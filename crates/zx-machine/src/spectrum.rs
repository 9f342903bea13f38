//! The assembled machine: CPU, bus, timing device and tape wiring.

use zx_core::{FrameSnapshot, MachineEvents};
use zx_tape::{SignalBlock, TapFile, TapePlayer, TzxFile};
use zx_z80::Z80;

use crate::bus::SpectrumBus;
use crate::config::{MachineConfig, MachineError, MachineModel};
use crate::memory::{Memory48K, Memory128K};
use crate::ula::{UlaClock, UlaTimings};

/// Tacts between audio samples (~48 kHz at 3.5 MHz).
const AUDIO_SAMPLE_TACTS: u64 = 73;

/// Screen memory size: 6144 bitmap + 768 attribute bytes.
const SCREEN_BYTES: usize = 0x1B00;

/// One Spectrum instance.
pub struct Spectrum {
    cpu: Z80,
    bus: SpectrumBus,
    model: MachineModel,
    /// Frame handoff scratch, reused every frame.
    screen: Vec<u8>,
    /// Speaker-level samples accumulated during the current frame.
    audio: Vec<f32>,
    next_sample_tact: u64,
}

impl Spectrum {
    /// Build a machine from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::BadRomSize`] if the ROM image does not
    /// match the model.
    pub fn new(config: &MachineConfig) -> Result<Self, MachineError> {
        let expected = match config.model {
            MachineModel::Spectrum48K => 0x4000,
            MachineModel::Spectrum128K => 0x8000,
        };
        if config.rom.len() != expected {
            return Err(MachineError::BadRomSize {
                expected,
                got: config.rom.len(),
            });
        }

        let bus = match config.model {
            MachineModel::Spectrum48K => SpectrumBus::new(
                Box::new(Memory48K::new(&config.rom)),
                UlaClock::new(UlaTimings::pal_48k()),
            ),
            MachineModel::Spectrum128K => SpectrumBus::new(
                Box::new(Memory128K::new(&config.rom)),
                UlaClock::new(UlaTimings::pal_128k()),
            ),
        };

        log::debug!("built {:?} machine", config.model);
        Ok(Self {
            cpu: Z80::new(),
            bus,
            model: config.model,
            screen: vec![0; SCREEN_BYTES],
            audio: Vec::new(),
            next_sample_tact: 0,
        })
    }

    /// Execute one instruction and let the devices observe the new tact.
    ///
    /// Events fire only from here, between instructions, never from inside
    /// instruction execution.
    pub fn step_instruction(&mut self, events: &mut dyn MachineEvents) {
        let tact = self.cpu.tacts().get();
        self.cpu.set_int(self.bus.ula.int_pending(tact));
        self.cpu.step(&mut self.bus);
        if self.cpu.int_acknowledged() {
            self.bus.ula.acknowledge_int();
        }

        let tact = self.cpu.tacts().get();
        while self.next_sample_tact <= tact {
            self.audio
                .push(if self.bus.speaker { 1.0 } else { 0.0 });
            self.next_sample_tact += AUDIO_SAMPLE_TACTS;
        }

        self.bus.ula.observe(tact);
        if self.bus.ula.take_frame_completed() {
            // A long MIC silence means a SAVE in progress has finished
            self.bus.recorder.flush(tact);

            self.bus.memory.copy_screen(&mut self.screen);
            let snapshot = FrameSnapshot {
                frame: self.bus.ula.frame_count() - 1,
                tact,
                screen: &self.screen,
                border: self.bus.border,
                audio: &self.audio,
            };
            events.frame_completed(&snapshot);
            self.audio.clear();
        }

        if let Some(player) = &mut self.bus.player
            && player.take_load_completed()
        {
            events.load_completed();
        }
        if self.bus.recorder.take_save_entered() {
            events.save_mode_entered();
        }
        if self.bus.recorder.take_save_left() {
            events.save_mode_left();
        }
    }

    /// Insert a parsed TAP file into the virtual tape deck.
    pub fn insert_tap(&mut self, tap: &TapFile) {
        self.insert_signal(tap.to_signal_blocks());
    }

    /// Insert a parsed TZX file.
    pub fn insert_tzx(&mut self, tzx: &TzxFile) {
        self.insert_signal(tzx.to_signal_blocks());
    }

    /// Insert pre-normalized playback blocks.
    pub fn insert_signal(&mut self, blocks: Vec<SignalBlock>) {
        let is_48k = self.model == MachineModel::Spectrum48K;
        self.bus.player = Some(TapePlayer::new(blocks, is_48k));
    }

    pub fn eject_tape(&mut self) {
        self.bus.player = None;
    }

    /// Start tape playback at the current tact.
    pub fn play_tape(&mut self) {
        let tact = self.cpu.tacts().get();
        if let Some(player) = &mut self.bus.player {
            player.play(tact);
        }
    }

    pub fn stop_tape(&mut self) {
        if let Some(player) = &mut self.bus.player {
            player.stop();
        }
    }

    pub fn rewind_tape(&mut self) {
        if let Some(player) = &mut self.bus.player {
            player.rewind();
        }
    }

    /// Blocks recorded by SAVE so far, as a TAP file.
    #[must_use]
    pub fn recorded_tap(&self) -> TapFile {
        TapFile::from_tape_blocks(self.bus.recorder.blocks())
    }

    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &SpectrumBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SpectrumBus {
        &mut self.bus
    }

    #[must_use]
    pub fn model(&self) -> MachineModel {
        self.model
    }

    /// Completed frames since reset.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.bus.ula.frame_count()
    }

    /// Tacts since reset.
    #[must_use]
    pub fn tacts(&self) -> u64 {
        self.cpu.tacts().get()
    }
}
