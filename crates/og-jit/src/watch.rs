//! Shared cache handle and write-invalidation hook
//!
//! The block cache is single-writer (only the CPU-emulation context
//! mutates it), but the access router holds a second handle for the
//! write tap, so the cache travels behind a shared mutex. The lock is
//! never contended in practice.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use og_mmu::CodeWatcher;

use crate::cache::JitBlockCache;

/// Cloneable handle to the block cache
#[derive(Clone)]
pub struct SharedBlockCache {
    inner: Arc<Mutex<JitBlockCache>>,
}

impl SharedBlockCache {
    /// Wrap a cache in a shared handle
    pub fn new(cache: JitBlockCache) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    /// Lock the cache for direct use
    pub fn lock(&self) -> MutexGuard<'_, JitBlockCache> {
        self.inner.lock()
    }
}

impl CodeWatcher for SharedBlockCache {
    fn notify_write(&self, address: u32, size: u32) {
        self.inner.lock().write_tap(address, size);
    }
}
