//! ULA timing model: memory contention, interrupt generation and frame
//! boundaries.
//!
//! # Timing (48K PAL)
//!
//! - 224 tacts per scanline, 312 lines per frame = 69,888 tacts
//! - INT asserted at frame tact 0, held for 32 tacts
//! - Screen fetch on lines 64-255, tacts 0-127 of the line
//! - Contention pattern `[6, 5, 4, 3, 2, 1, 0, 0]`, repeating every 8 tacts
//!
//! The device never ticks on its own: it is observed with the CPU's tact
//! counter once per instruction boundary. Frame boundaries carry the tact
//! overflow forward, so an instruction straddling the boundary shortens the
//! next frame by exactly the overlap and cumulative timing never drifts.

/// Frame geometry and interrupt position for one machine model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UlaTimings {
    /// CPU tacts per scanline.
    pub tacts_per_line: u32,
    /// Scanlines per frame.
    pub lines_per_frame: u32,
    /// First line of the screen fetch area.
    pub first_screen_line: u32,
    /// Number of screen lines.
    pub screen_lines: u32,
    /// Tacts of each line subject to contention.
    pub contention_tacts: u32,
    /// Frame tact at which INT asserts.
    pub interrupt_tact: u32,
    /// Tacts the INT line stays asserted.
    pub interrupt_length: u32,
}

/// Contention delay pattern, repeating every 8 tacts.
const CONTENTION_PATTERN: [u8; 8] = [6, 5, 4, 3, 2, 1, 0, 0];

/// The memory access of a contended cycle lands two tacts into it.
const CONTENTION_OFFSET: i64 = 2;

impl UlaTimings {
    /// 48K PAL timings.
    #[must_use]
    pub const fn pal_48k() -> Self {
        Self {
            tacts_per_line: 224,
            lines_per_frame: 312,
            first_screen_line: 64,
            screen_lines: 192,
            contention_tacts: 128,
            interrupt_tact: 0,
            interrupt_length: 32,
        }
    }

    /// 128K PAL timings: one extra tact per line, one line fewer.
    #[must_use]
    pub const fn pal_128k() -> Self {
        Self {
            tacts_per_line: 228,
            lines_per_frame: 311,
            first_screen_line: 63,
            screen_lines: 192,
            contention_tacts: 128,
            interrupt_tact: 0,
            interrupt_length: 36,
        }
    }

    /// Total tacts in one frame.
    #[must_use]
    pub const fn frame_tacts(&self) -> u64 {
        self.tacts_per_line as u64 * self.lines_per_frame as u64
    }

    /// Memory contention delay at a frame-relative tact. A pure function
    /// of raster position; the accessed address only decides whether it
    /// applies at all.
    #[must_use]
    pub fn contention_delay(&self, frame_tact: u64) -> u32 {
        let line = (frame_tact / u64::from(self.tacts_per_line)) as u32;
        if line < self.first_screen_line || line >= self.first_screen_line + self.screen_lines {
            return 0;
        }
        let line_tact = (frame_tact % u64::from(self.tacts_per_line)) as i64;
        self.delay_at(line_tact - CONTENTION_OFFSET)
    }

    /// I/O contention for one 4-tact I/O cycle. Which of the four patterns
    /// applies depends on whether the port's high byte lies in a contended
    /// page and whether it is the ULA's own (even) port.
    #[must_use]
    pub fn io_contention_delay(
        &self,
        frame_tact: u64,
        contended_high: bool,
        ula_port: bool,
    ) -> u32 {
        let line = (frame_tact / u64::from(self.tacts_per_line)) as u32;
        if line < self.first_screen_line || line >= self.first_screen_line + self.screen_lines {
            return 0;
        }
        let base = (frame_tact % u64::from(self.tacts_per_line)) as i64 - 1;

        match (contended_high, ula_port) {
            // N:4 — untouched
            (false, false) => 0,
            // N:1, C:3
            (false, true) => self.delay_at(base + 1),
            // C:1, C:3
            (true, true) => {
                let d0 = self.delay_at(base);
                let d1 = self.delay_at(base + 1 + i64::from(d0));
                d0 + d1
            }
            // C:1, C:1, C:1, C:1
            (true, false) => {
                let d0 = self.delay_at(base);
                let d1 = self.delay_at(base + 1 + i64::from(d0));
                let d2 = self.delay_at(base + 2 + i64::from(d0) + i64::from(d1));
                let d3 =
                    self.delay_at(base + 3 + i64::from(d0) + i64::from(d1) + i64::from(d2));
                d0 + d1 + d2 + d3
            }
        }
    }

    /// Pattern lookup for a line-relative tact, zero outside the window.
    fn delay_at(&self, line_tact: i64) -> u32 {
        if line_tact < 0 || line_tact >= i64::from(self.contention_tacts) {
            return 0;
        }
        u32::from(CONTENTION_PATTERN[(line_tact % 8) as usize])
    }
}

/// The interrupt/timing device: watches the tact clock against the frame
/// geometry, raises INT once per frame, and reports frame boundaries.
pub struct UlaClock {
    timings: UlaTimings,
    /// Tact at which the current frame began.
    frame_base: u64,
    /// Completed frames.
    frame_count: u64,
    /// INT already acknowledged this frame.
    int_served: bool,
    /// Frame boundary crossed since the last take.
    frame_completed: bool,
}

impl UlaClock {
    #[must_use]
    pub fn new(timings: UlaTimings) -> Self {
        Self {
            timings,
            frame_base: 0,
            frame_count: 0,
            int_served: false,
            frame_completed: false,
        }
    }

    #[must_use]
    pub fn timings(&self) -> &UlaTimings {
        &self.timings
    }

    /// Completed frame count.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Tact within the current frame.
    #[must_use]
    pub fn frame_tact(&self, tact: u64) -> u64 {
        tact.saturating_sub(self.frame_base) % self.timings.frame_tacts()
    }

    /// Advance the frame window past `tact`, observed once per instruction
    /// boundary. Crossing a boundary re-arms INT and latches the
    /// frame-completed signal; the overflow into the new frame is kept.
    pub fn observe(&mut self, tact: u64) {
        let frame_len = self.timings.frame_tacts();
        while tact.saturating_sub(self.frame_base) >= frame_len {
            self.frame_base += frame_len;
            self.frame_count += 1;
            self.int_served = false;
            self.frame_completed = true;
        }
    }

    /// Is the INT line asserted at `tact`? True from the configured tact
    /// for the configured window, until acknowledged.
    #[must_use]
    pub fn int_pending(&self, tact: u64) -> bool {
        if self.int_served {
            return false;
        }
        let frame_tact = tact.saturating_sub(self.frame_base);
        let from = u64::from(self.timings.interrupt_tact);
        frame_tact >= from && frame_tact < from + u64::from(self.timings.interrupt_length)
    }

    /// The CPU acknowledged the interrupt; the line drops until the next
    /// frame's window.
    pub fn acknowledge_int(&mut self) {
        self.int_served = true;
    }

    /// Frame-completed latch; clears on read.
    pub fn take_frame_completed(&mut self) -> bool {
        core::mem::take(&mut self.frame_completed)
    }

    /// Memory contention for an access at `tact`.
    #[must_use]
    pub fn contention_at(&self, tact: u64) -> u32 {
        self.timings.contention_delay(self.frame_tact(tact))
    }

    /// I/O contention for an access at `tact`.
    #[must_use]
    pub fn io_contention_at(&self, tact: u64, contended_high: bool, ula_port: bool) -> u32 {
        self.timings
            .io_contention_delay(self.frame_tact(tact), contended_high, ula_port)
    }
}
