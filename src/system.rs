//! Session wiring
//!
//! Builds the memory subsystem and the JIT block cache from one
//! configuration and connects the guest-write invalidation path between
//! them.

use std::sync::Arc;

use og_core::config::Config;
use og_jit::{JitBlockCache, PortablePatcher, SharedBlockCache};
use og_memory::{FramebufferAccess, NullFramebuffer, SnapshotSection};
use og_mmu::Bus;

/// One emulation session
pub struct System {
    /// The hardware access router and its regions
    pub bus: Bus,
    /// The JIT block cache handle
    pub jit: SharedBlockCache,
}

impl System {
    /// Build a session with the null framebuffer backend
    pub fn new(config: &Config) -> Self {
        Self::with_framebuffer(config, Box::new(NullFramebuffer::new()))
    }

    /// Build a session against a real video backend
    pub fn with_framebuffer(config: &Config, framebuffer: Box<dyn FramebufferAccess>) -> Self {
        let mut bus = Bus::new(config, framebuffer);
        let jit = SharedBlockCache::new(JitBlockCache::new(
            config.jit.code_capacity,
            Box::new(PortablePatcher::new()),
        ));
        // Guest writes into compiled ranges must destroy the stale
        // blocks before that code can run again.
        bus.set_code_watcher(Arc::new(jit.clone()));
        tracing::info!("System wired: {:?} / {:?}", config.system.console, config.system.mmu);
        Self { bus, jit }
    }

    /// Raw region dumps for the state-serialization collaborator
    pub fn snapshot_sections(&self) -> Vec<SnapshotSection<'_>> {
        self.bus.space.snapshot_sections()
    }

    /// A saved state was loaded into the regions: compiled code no
    /// longer matches memory, so the cache is dropped wholesale and
    /// repopulates lazily.
    pub fn on_state_loaded(&mut self) {
        self.jit.lock().clear();
        self.bus.mmu.flush_tlb();
    }

    /// Deterministic-sync quiesce point: the FIFO distance only has a
    /// well-defined value once the video context's read pointer has
    /// caught up to the published write pointer, so spin until it has.
    pub fn quiesce_fifo<F: FnMut() -> u32>(&self, mut read_pointer: F) {
        let target = self.bus.gather_pipe.write_pointer();
        og_core::sync::spin_wait_until(|| read_pointer() >= target);
    }
}
