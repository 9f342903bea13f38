//! Memory and I/O bus interface.

/// Memory and I/O bus interface.
///
/// The CPU accesses memory and peripherals through this trait. The bus
/// handles address decoding, banking, and routing to the appropriate device.
///
/// Contention hooks receive the current tact so the bus can compute the
/// stall from the raster position at the moment of the access. The CPU
/// adds the returned wait tacts to its clock *before* performing the access.
pub trait Bus {
    /// Read a byte from the given address.
    fn read(&mut self, addr: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, addr: u16, value: u8);

    /// Read a byte from the given I/O port.
    fn read_port(&mut self, port: u16, tact: u64) -> u8;

    /// Write a byte to the given I/O port.
    fn write_port(&mut self, port: u16, value: u8, tact: u64);

    /// Wait tacts to inject before a memory access at `tact`.
    ///
    /// Zero unless the address lies in a contended page and the raster is
    /// inside the contention window.
    fn contention_wait(&self, addr: u16, tact: u64) -> u32 {
        let _ = (addr, tact);
        0
    }

    /// Wait tacts to inject for an I/O access at `tact`.
    fn port_contention_wait(&self, port: u16, tact: u64) -> u32 {
        let _ = (port, tact);
        0
    }
}
