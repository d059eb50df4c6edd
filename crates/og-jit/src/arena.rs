//! Fixed-capacity code arena
//!
//! Generated blocks live in one pre-allocated buffer; entry points and
//! patch sites are plain offsets into it. The arena never grows: when it
//! (or the block table) fills up, the whole cache is reset instead of
//! resized, which keeps the hot paths allocator-free.

/// The arena
pub struct CodeArena {
    buf: Box<[u8]>,
    used: usize,
}

impl CodeArena {
    /// Allocate an arena of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    /// Append a block of generated code; returns its base offset, or
    /// `None` when the arena is exhausted.
    pub fn emit(&mut self, code: &[u8]) -> Option<usize> {
        if self.used + code.len() > self.buf.len() {
            return None;
        }
        let offset = self.used;
        self.buf[offset..offset + code.len()].copy_from_slice(code);
        self.used += code.len();
        Some(offset)
    }

    /// Borrow a patchable site
    pub fn site_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.buf[offset..offset + len]
    }

    /// Borrow emitted code
    pub fn code(&self, offset: usize, len: usize) -> &[u8] {
        &self.buf[offset..offset + len]
    }

    /// Bytes in use
    pub fn used(&self) -> usize {
        self.used
    }

    /// Total capacity
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Discard all emitted code
    pub fn reset(&mut self) {
        self.used = 0;
        self.buf.fill(0);
    }
}
