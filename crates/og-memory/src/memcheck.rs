//! Memory watchpoints
//!
//! Ranged read/write watchpoints evaluated from the access router after
//! every completed access when debug instrumentation is enabled.

use bitflags::bitflags;

bitflags! {
    /// Which accesses a watchpoint reacts to
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WatchKind: u32 {
        /// Trigger on reads
        const READ  = 0b01;
        /// Trigger on writes
        const WRITE = 0b10;
    }
}

/// A single memory watchpoint
#[derive(Debug, Clone)]
pub struct MemCheck {
    /// Unique watchpoint ID
    pub id: u32,
    /// First address covered
    pub start_address: u32,
    /// Last address covered (inclusive)
    pub end_address: u32,
    /// Access kinds that trigger
    pub kind: WatchKind,
    /// Log a message on hit
    pub log_on_hit: bool,
    /// Request a CPU break on hit
    pub break_on_hit: bool,
    /// Number of times this watchpoint was triggered
    pub num_hits: u64,
}

/// Result of evaluating a watchpoint against an access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchHit {
    /// Watchpoint that fired
    pub id: u32,
    /// The CPU should stop
    pub should_break: bool,
}

/// Watchpoint registry
#[derive(Debug, Default)]
pub struct MemChecks {
    checks: Vec<MemCheck>,
    next_id: u32,
}

impl MemChecks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watchpoint over `[start, end]`
    pub fn add(&mut self, start_address: u32, end_address: u32, kind: WatchKind) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.checks.push(MemCheck {
            id,
            start_address,
            end_address,
            kind,
            log_on_hit: true,
            break_on_hit: true,
            num_hits: 0,
        });
        tracing::debug!(
            "Added memcheck {} over 0x{:08x}..=0x{:08x}",
            id,
            start_address,
            end_address
        );
        id
    }

    /// Remove a watchpoint by ID
    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.checks.len();
        self.checks.retain(|c| c.id != id);
        self.checks.len() != before
    }

    /// True when no watchpoints are registered
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Find the watchpoint covering an address, if any
    pub fn get_memcheck(&mut self, address: u32) -> Option<&mut MemCheck> {
        self.checks
            .iter_mut()
            .find(|c| address >= c.start_address && address <= c.end_address)
    }

    /// Evaluate an access against the registry
    pub fn action(
        &mut self,
        address: u32,
        value: u64,
        write: bool,
        size: u32,
        pc: u32,
    ) -> Option<WatchHit> {
        let check = self.get_memcheck(address)?;
        let kind = if write {
            WatchKind::WRITE
        } else {
            WatchKind::READ
        };
        if !check.kind.contains(kind) {
            return None;
        }
        check.num_hits += 1;
        if check.log_on_hit {
            tracing::info!(
                "MemCheck {}: {} 0x{:x} ({} bytes) at 0x{:08x}, PC=0x{:08x}",
                check.id,
                if write { "write" } else { "read" },
                value,
                size,
                address,
                pc
            );
        }
        Some(WatchHit {
            id: check.id,
            should_break: check.break_on_hit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_counting() {
        let mut checks = MemChecks::new();
        let id = checks.add(0x1000, 0x1FFF, WatchKind::WRITE);

        let hit = checks.action(0x1800, 5, true, 4, 0x8000_0000).unwrap();
        assert_eq!(hit.id, id);
        assert!(hit.should_break);
        assert_eq!(checks.get_memcheck(0x1800).unwrap().num_hits, 1);

        // Reads don't trigger a write watchpoint.
        assert!(checks.action(0x1800, 5, false, 4, 0).is_none());
        // Out of range.
        assert!(checks.action(0x2000, 5, true, 4, 0).is_none());
    }

    #[test]
    fn test_remove() {
        let mut checks = MemChecks::new();
        let id = checks.add(0, 0xFF, WatchKind::READ | WatchKind::WRITE);
        assert!(checks.remove(id));
        assert!(!checks.remove(id));
        assert!(checks.is_empty());
    }
}
