//! Memory-mapped I/O dispatch
//!
//! Device register emulation lives outside this subsystem; devices hand
//! us plain read/write callbacks registered against a register window.

/// A device responding to register reads and writes.
///
/// Addresses are presented in the 0xCC/0xCD register space, relative to
/// nothing: handlers see the full address and mask what they need.
pub trait MmioDevice {
    /// Register read of `size` bytes (1, 2, 4 or 8)
    fn read(&mut self, address: u32, size: u32) -> u64;

    /// Register write of `size` bytes (1, 2, 4 or 8)
    fn write(&mut self, address: u32, size: u32, value: u64);
}

struct MmioWindow {
    base: u32,
    size: u32,
    device: Box<dyn MmioDevice>,
}

/// Registry of MMIO windows
#[derive(Default)]
pub struct MmioMap {
    windows: Vec<MmioWindow>,
}

impl MmioMap {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device over `[base, base + size)`
    pub fn register(&mut self, base: u32, size: u32, device: Box<dyn MmioDevice>) {
        tracing::debug!("MMIO window registered at 0x{:08x} (+0x{:x})", base, size);
        self.windows.push(MmioWindow { base, size, device });
    }

    fn window_mut(&mut self, address: u32) -> Option<&mut MmioWindow> {
        self.windows
            .iter_mut()
            .find(|w| address.wrapping_sub(w.base) < w.size)
    }

    /// Dispatch a register read; unmapped registers read as zero
    pub fn read(&mut self, address: u32, size: u32) -> u64 {
        match self.window_mut(address) {
            Some(window) => window.device.read(address, size),
            None => {
                tracing::warn!("Read from unmapped MMIO register 0x{:08x}", address);
                0
            }
        }
    }

    /// Dispatch a register write; unmapped registers swallow the value
    pub fn write(&mut self, address: u32, size: u32, value: u64) {
        match self.window_mut(address) {
            Some(window) => window.device.write(address, size, value),
            None => {
                tracing::warn!(
                    "Write to unmapped MMIO register 0x{:08x} = 0x{:x}",
                    address,
                    value
                );
            }
        }
    }
}
