//! Gather pipe (graphics FIFO write window)
//!
//! Writes to the gather pipe page accumulate big-endian bytes in a small
//! staging buffer and drain to the FIFO in RAM one 32-byte burst at a
//! time. The write pointer is published with an atomic store: the video
//! command context polls it from its own thread, and that pointer (plus
//! the interrupt-pending flags) is the whole cross-context handshake.
//! There are no locks on this path.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::address_space::AddressSpace;
use crate::constants::CACHE_LINE_SIZE;
use crate::value::MemValue;

/// One burst is a guest cache line
pub const BURST_SIZE: usize = CACHE_LINE_SIZE as usize;
/// Staging capacity; bursts drain before this fills
const PIPE_CAPACITY: usize = BURST_SIZE * 16;

/// The CPU-side gather pipe
pub struct GatherPipe {
    pipe: [u8; PIPE_CAPACITY],
    count: usize,
    fifo_base: u32,
    fifo_end: u32,
    write_pointer: AtomicU32,
}

impl GatherPipe {
    /// Create a gather pipe with no FIFO configured
    pub fn new() -> Self {
        Self {
            pipe: [0; PIPE_CAPACITY],
            count: 0,
            fifo_base: 0,
            fifo_end: 0,
            write_pointer: AtomicU32::new(0),
        }
    }

    /// Configure the FIFO region the pipe drains into
    pub fn set_fifo(&mut self, base: u32, end: u32, write_pointer: u32) {
        self.fifo_base = base;
        self.fifo_end = end;
        self.write_pointer.store(write_pointer, Ordering::Release);
        self.count = 0;
    }

    /// Current published write pointer (readable from the video context)
    #[inline]
    pub fn write_pointer(&self) -> u32 {
        self.write_pointer.load(Ordering::Acquire)
    }

    /// Bytes staged but not yet drained
    pub fn pending(&self) -> usize {
        self.count
    }

    /// Append a typed big-endian value and drain any complete bursts
    pub fn write<T: MemValue>(&mut self, space: &mut AddressSpace, value: T) {
        value.write_be(&mut self.pipe[self.count..]);
        self.count += T::SIZE;
        self.drain_bursts(space);
    }

    fn drain_bursts(&mut self, space: &mut AddressSpace) {
        while self.count >= BURST_SIZE {
            let wp = self.write_pointer.load(Ordering::Relaxed);
            let mut burst = [0u8; BURST_SIZE];
            burst.copy_from_slice(&self.pipe[..BURST_SIZE]);
            if space.device_copy_to_emu(wp, &burst).is_err() {
                tracing::error!("Gather pipe burst to unmapped FIFO at 0x{:08x}", wp);
            }

            let mut next = wp + BURST_SIZE as u32;
            if next >= self.fifo_end {
                next = self.fifo_base;
            }
            self.write_pointer.store(next, Ordering::Release);

            self.pipe.copy_within(BURST_SIZE..self.count, 0);
            self.count -= BURST_SIZE;
        }
    }
}

impl Default for GatherPipe {
    fn default() -> Self {
        Self::new()
    }
}
