//! The fundamental unit of time in the emulator.

/// A count of CPU clock tacts.
///
/// This is the fundamental unit of time in the emulator. All device timing
/// (contention windows, interrupt raster position, tape pulse lengths) is
/// expressed in tacts of the CPU clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tacts(pub u64);

impl Tacts {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::ops::Add for Tacts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl core::ops::AddAssign for Tacts {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl core::ops::Sub for Tacts {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl From<u64> for Tacts {
    fn from(count: u64) -> Self {
        Self(count)
    }
}
