//! Debugger breakpoint set.

use std::collections::HashSet;

/// Breakpoint addresses plus an optional one-shot "imminent" breakpoint,
/// consulted before each fetch when running in debugger mode.
#[derive(Debug, Default, Clone)]
pub struct Breakpoints {
    set: HashSet<u16>,
    imminent: Option<u16>,
}

impl Breakpoints {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, addr: u16) {
        self.set.insert(addr);
    }

    pub fn remove(&mut self, addr: u16) {
        self.set.remove(&addr);
    }

    #[must_use]
    pub fn contains(&self, addr: u16) -> bool {
        self.set.contains(&addr)
    }

    pub fn clear(&mut self) {
        self.set.clear();
        self.imminent = None;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.imminent.is_none()
    }

    /// Arm the single-shot breakpoint (overrides any previous one).
    pub fn set_imminent(&mut self, addr: u16) {
        self.imminent = Some(addr);
    }

    /// Should execution stop at `pc`? Consumes the imminent breakpoint if
    /// it matches.
    pub fn hit(&mut self, pc: u16) -> bool {
        if self.imminent == Some(pc) {
            self.imminent = None;
            return true;
        }
        self.set.contains(&pc)
    }
}
