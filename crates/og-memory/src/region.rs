//! Memory region descriptors

use bitflags::bitflags;

use crate::constants::*;

bitflags! {
    /// Region presence flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegionFlags: u32 {
        /// Region exists only on Wii
        const WII_ONLY       = 0b0001;
        /// Region exists only when fake-VMEM mode is enabled
        const FAKE_VMEM_ONLY = 0b0010;
    }
}

impl Default for RegionFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Identifies one of the backed memory regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// Main console RAM
    Ram,
    /// Locked L1 cache
    L1Cache,
    /// Wii expansion RAM
    Exram,
    /// Fake-VMEM compatibility backing
    FakeVmem,
}

/// Static description of a memory region
#[derive(Debug, Clone, Copy)]
pub struct RegionDescriptor {
    /// Which region this is
    pub kind: RegionKind,
    /// Base physical address of the region's window
    pub base: u32,
    /// Region size in bytes
    pub size: u32,
    /// Presence flags
    pub flags: RegionFlags,
}

/// The fixed region table; regions are allocated from this at init and
/// are immutable for the session.
pub const REGION_TABLE: &[RegionDescriptor] = &[
    RegionDescriptor {
        kind: RegionKind::Ram,
        base: 0x0000_0000,
        size: RAM_SIZE,
        flags: RegionFlags::empty(),
    },
    RegionDescriptor {
        kind: RegionKind::L1Cache,
        base: L1_CACHE_BASE,
        size: L1_CACHE_SIZE,
        flags: RegionFlags::empty(),
    },
    RegionDescriptor {
        kind: RegionKind::Exram,
        base: 0x1000_0000,
        size: EXRAM_SIZE,
        flags: RegionFlags::WII_ONLY,
    },
    RegionDescriptor {
        kind: RegionKind::FakeVmem,
        base: FAKE_VMEM_BASE,
        size: FAKE_VMEM_SIZE,
        flags: RegionFlags::FAKE_VMEM_ONLY,
    },
];
