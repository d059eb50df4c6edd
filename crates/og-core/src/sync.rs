//! Cross-context synchronization helpers
//!
//! The CPU-emulation context and the video command context coordinate
//! through a handful of lock-free flags (FIFO write pointer, interrupt
//! pending bits). When one context has to observe a value that is only
//! well defined once the other has caught up, it spins: the two contexts
//! must stay within a bounded skew, so parking a thread would cost more
//! than it saves.

use std::sync::atomic::{AtomicBool, Ordering};

/// Spin iterations before falling back to an OS yield
const SPIN_BEFORE_YIELD: u32 = 64;

/// Busy-wait until `cond` returns true.
///
/// Spins briefly, then yields to the scheduler between probes. Never
/// blocks indefinitely on its own: the condition is expected to become
/// true within the bounded skew the caller maintains.
pub fn spin_wait_until<F: FnMut() -> bool>(mut cond: F) {
    let mut spins = 0u32;
    while !cond() {
        if spins < SPIN_BEFORE_YIELD {
            std::hint::spin_loop();
            spins += 1;
        } else {
            std::thread::yield_now();
        }
    }
}

/// A one-way handshake flag shared between the two contexts
#[derive(Debug, Default)]
pub struct HandshakeFlag {
    flag: AtomicBool,
}

impl HandshakeFlag {
    /// Create a lowered flag
    pub const fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    /// Raise the flag
    #[inline]
    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Lower the flag
    #[inline]
    pub fn lower(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Check the flag
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Spin until the flag is raised
    pub fn wait(&self) {
        spin_wait_until(|| self.is_raised());
    }
}
