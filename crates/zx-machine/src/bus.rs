//! Machine bus: memory routing, I/O port decode, contention and tape
//! wiring.
//!
//! Port decode ($FE when bit 0 is clear, $7FFD for 128K banking) follows
//! the hardware's partial address decoding. Reads from unclaimed ports see
//! the floating bus.

use zx_core::Bus;
use zx_tape::{TapePlayer, TapeRecorder};

use crate::memory::SpectrumMemory;
use crate::ula::UlaClock;

/// The Spectrum bus.
pub struct SpectrumBus {
    pub memory: Box<dyn SpectrumMemory>,
    pub ula: UlaClock,
    /// Inserted tape, if any.
    pub player: Option<TapePlayer>,
    /// Always armed; SAVE output lands here.
    pub recorder: TapeRecorder,
    /// Keyboard matrix rows, bits 0-4 active low. All released by default;
    /// host shells poke these between instructions.
    pub key_rows: [u8; 8],
    /// Border colour (0-7) from the last $FE write.
    pub border: u8,
    /// Speaker level (bit 4 of the last $FE write).
    pub speaker: bool,
    /// MIC output level (bit 3 of the last $FE write).
    pub mic: bool,
}

impl SpectrumBus {
    #[must_use]
    pub fn new(memory: Box<dyn SpectrumMemory>, ula: UlaClock) -> Self {
        Self {
            memory,
            ula,
            player: None,
            recorder: TapeRecorder::new(),
            key_rows: [0x1F; 8],
            border: 7,
            speaker: false,
            mic: false,
        }
    }

    /// Keyboard read: AND of the rows selected by the zero bits of the
    /// port's high byte.
    fn read_keyboard(&self, high: u8) -> u8 {
        let mut value = 0x1F;
        for (row, bits) in self.key_rows.iter().enumerate() {
            if high & (1 << row) == 0 {
                value &= bits;
            }
        }
        value
    }

    /// EAR input level at `tact`: the tape when one is playing, otherwise
    /// the MIC loopback the issue-3 hardware exhibits.
    fn ear_level(&mut self, tact: u64) -> bool {
        match &mut self.player {
            Some(player) if player.is_playing() => player.ear_bit(tact),
            _ => self.mic,
        }
    }
}

impl Bus for SpectrumBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.memory.write(addr, value);
    }

    fn read_port(&mut self, port: u16, tact: u64) -> u8 {
        if port & 0x0001 == 0 {
            // ULA port: bits 0-4 keyboard, bit 5 high, bit 6 EAR, bit 7 high
            let keyboard = self.read_keyboard((port >> 8) as u8);
            let ear = if self.ear_level(tact) { 0x40 } else { 0x00 };
            return keyboard | 0xA0 | ear;
        }
        // Unclaimed port: the floating bus leaks whatever the ULA is
        // fetching; outside the fetch window it reads $FF.
        let frame_tact = self.ula.frame_tact(tact);
        floating_bus(&*self.memory, self.ula.timings(), frame_tact)
    }

    fn write_port(&mut self, port: u16, value: u8, tact: u64) {
        if port & 0x0001 == 0 {
            self.border = value & 0x07;
            self.speaker = value & 0x10 != 0;
            let mic = value & 0x08 != 0;
            if mic != self.mic {
                self.mic = mic;
                self.recorder.mic_bit(tact, mic);
            }
            return;
        }
        // $7FFD: bit 1 clear, bit 15 clear selects the bank register
        if port & 0x8002 == 0 {
            self.memory.write_bank_register(value);
        }
    }

    fn contention_wait(&self, addr: u16, tact: u64) -> u32 {
        if self.memory.contended_page(addr) {
            self.ula.contention_at(tact)
        } else {
            0
        }
    }

    fn port_contention_wait(&self, port: u16, tact: u64) -> u32 {
        let ula_port = port & 0x0001 == 0;
        let contended_high = self.memory.contended_page(port);
        self.ula.io_contention_at(tact, contended_high, ula_port)
    }
}

/// What the ULA's data bus shows at a frame tact: bitmap and attribute
/// bytes during the four fetch phases of each 8-tact group, $FF otherwise.
fn floating_bus(
    memory: &dyn SpectrumMemory,
    timings: &crate::ula::UlaTimings,
    frame_tact: u64,
) -> u8 {
    let line = (frame_tact / u64::from(timings.tacts_per_line)) as u32;
    let line_tact = (frame_tact % u64::from(timings.tacts_per_line)) as u32;
    if line < timings.first_screen_line
        || line >= timings.first_screen_line + timings.screen_lines
        || line_tact >= timings.contention_tacts
    {
        return 0xFF;
    }

    let phase = line_tact % 8;
    if phase >= 4 {
        return 0xFF;
    }

    let screen_y = line - timings.first_screen_line;
    let char_col = (line_tact / 8) * 2 + (phase / 2);
    if char_col >= 32 {
        return 0xFF;
    }

    match phase % 2 {
        0 => memory.peek(bitmap_addr(screen_y as u8, char_col as u8)),
        _ => memory.peek(attr_addr(screen_y as u8, char_col as u8)),
    }
}

/// Bitmap address: `010Y7 Y6Y2 Y1Y0 Y5Y4Y3 X4X3X2X1X0`.
fn bitmap_addr(screen_y: u8, char_col: u8) -> u16 {
    let y7y6 = u16::from((screen_y >> 6) & 0x03);
    let y5y4y3 = u16::from((screen_y >> 3) & 0x07);
    let y2y1y0 = u16::from(screen_y & 0x07);
    0x4000 | (y7y6 << 11) | (y2y1y0 << 8) | (y5y4y3 << 5) | u16::from(char_col)
}

/// Attribute address: `0101 10Y7 Y6Y5 Y4Y3 X4X3X2X1X0`.
fn attr_addr(screen_y: u8, char_col: u8) -> u16 {
    0x5800 | (u16::from(screen_y / 8) << 5) | u16::from(char_col)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory48K;
    use crate::ula::UlaTimings;

    fn make_bus() -> SpectrumBus {
        let memory = Box::new(Memory48K::new(&vec![0u8; 0x4000]));
        SpectrumBus::new(memory, UlaClock::new(UlaTimings::pal_48k()))
    }

    #[test]
    fn fe_write_latches_border_speaker_mic() {
        let mut bus = make_bus();
        bus.write_port(0x00FE, 0b0001_1010, 100);
        assert_eq!(bus.border, 2);
        assert!(bus.speaker);
        assert!(bus.mic);
    }

    #[test]
    fn fe_read_idle_keyboard() {
        let mut bus = make_bus();
        // No keys pressed, MIC low: bits 0-4 high, 5 and 7 high, EAR low
        assert_eq!(bus.read_port(0xFEFE, 0), 0xBF);
    }

    #[test]
    fn fe_read_reflects_key_rows() {
        let mut bus = make_bus();
        bus.key_rows[0] = 0x1E; // CAPS SHIFT down (row $FE, bit 0)
        assert_eq!(bus.read_port(0xFEFE, 0) & 0x1F, 0x1E);
        // A half-row not selected reads released
        assert_eq!(bus.read_port(0xFDFE, 0) & 0x1F, 0x1F);
    }

    #[test]
    fn mic_loopback_feeds_ear_without_tape() {
        let mut bus = make_bus();
        bus.write_port(0x00FE, 0x08, 50);
        assert_ne!(bus.read_port(0x00FE, 60) & 0x40, 0);
        bus.write_port(0x00FE, 0x00, 70);
        assert_eq!(bus.read_port(0x00FE, 80) & 0x40, 0);
    }

    #[test]
    fn mic_edges_reach_the_recorder() {
        let mut bus = make_bus();
        // A pilot-length pulse train on MIC enters save mode
        let mut tact = 0u64;
        let mut level = 0x00u8;
        for _ in 0..20 {
            tact += 2168;
            level ^= 0x08;
            bus.write_port(0x00FE, level, tact);
        }
        assert!(bus.recorder.is_recording());
    }

    #[test]
    fn contention_only_in_contended_pages() {
        let bus = make_bus();
        // Line 64, tact 2 contends by 6 in the $4000 page, not elsewhere
        let tact = 64 * 224 + 2;
        assert_eq!(bus.contention_wait(0x4000, tact), 6);
        assert_eq!(bus.contention_wait(0x8000, tact), 0);
        assert_eq!(bus.contention_wait(0x0000, tact), 0);
    }

    #[test]
    fn contention_same_for_all_addresses_in_region() {
        let bus = make_bus();
        for line in [64u64, 100, 255] {
            for line_tact in 0..224u64 {
                let tact = line * 224 + line_tact;
                let reference = bus.contention_wait(0x4000, tact);
                for addr in [0x4001u16, 0x5AFF, 0x6000, 0x7FFF] {
                    assert_eq!(
                        bus.contention_wait(addr, tact),
                        reference,
                        "line {line} tact {line_tact} addr {addr:#06X}"
                    );
                }
            }
        }
    }

    #[test]
    fn floating_bus_leaks_screen_bytes() {
        let mut bus = make_bus();
        bus.memory.write(0x4000, 0xAA); // bitmap, col 0
        bus.memory.write(0x5800, 0x38); // attribute, col 0

        let base = 64 * 224;
        assert_eq!(bus.read_port(0x40FF, base), 0xAA); // phase 0: bitmap col 0
        assert_eq!(bus.read_port(0x40FF, base + 1), 0x38); // phase 1: attr col 0
    }

    #[test]
    fn floating_bus_idle_outside_fetch() {
        let mut bus = make_bus();
        assert_eq!(bus.read_port(0x40FF, 0), 0xFF, "vblank");
        assert_eq!(bus.read_port(0x40FF, 64 * 224 + 130), 0xFF, "past window");
        assert_eq!(bus.read_port(0x40FF, 64 * 224 + 4), 0xFF, "idle phase");
    }

    #[test]
    fn bank_register_decode() {
        use crate::memory::Memory128K;
        let mut rom = vec![0u8; 0x8000];
        rom[0] = 0xAA;
        rom[0x4000] = 0xBB;
        let mut bus = SpectrumBus::new(
            Box::new(Memory128K::new(&rom)),
            UlaClock::new(UlaTimings::pal_128k()),
        );
        bus.write_port(0x7FFD, 0x10, 0);
        assert_eq!(bus.read(0x0000), 0xBB);
        // Odd-bit-1 ports don't hit the register
        bus.write_port(0x7FFF, 0x00, 0);
        assert_eq!(bus.read(0x0000), 0xBB);
    }
}
