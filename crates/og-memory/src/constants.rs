//! GameCube/Wii memory map constants

/// Main memory size reported to emulated software (24 MB)
pub const REALRAM_SIZE: u32 = 0x0180_0000;
/// Main memory allocation, rounded up to a power of two (32 MB)
pub const RAM_SIZE: u32 = 0x0200_0000;
/// Mask for wrapping offsets into the main memory allocation
pub const RAM_MASK: u32 = RAM_SIZE - 1;

/// Locked L1 cache size (256 KB)
pub const L1_CACHE_SIZE: u32 = 0x0004_0000;
/// Mask for wrapping offsets into the locked cache
pub const L1_CACHE_MASK: u32 = L1_CACHE_SIZE - 1;
/// Base of the locked cache window (segment 0xE)
pub const L1_CACHE_BASE: u32 = 0xE000_0000;

/// Wii expansion RAM size (64 MB)
pub const EXRAM_SIZE: u32 = 0x0400_0000;
/// Mask for wrapping offsets into expansion RAM
pub const EXRAM_MASK: u32 = EXRAM_SIZE - 1;

/// Physical base of the fake-VMEM backing region
pub const FAKE_VMEM_BASE: u32 = 0x7E00_0000;
/// Fake-VMEM backing size (same allocation as main RAM)
pub const FAKE_VMEM_SIZE: u32 = RAM_SIZE;

/// The two 256 MB guest windows redirected into fake-VMEM
pub const FAKE_VMEM_WINDOWS: [u32; 2] = [0x4000_0000, 0x7000_0000];
/// Size of each fake-VMEM guest window
pub const FAKE_VMEM_WINDOW_SIZE: u32 = 0x1000_0000;

/// Hardware page size (4 KB)
pub const PAGE_SIZE: u32 = 0x1000;
/// Page offset mask
pub const PAGE_MASK: u32 = PAGE_SIZE - 1;
/// Page index shift
pub const PAGE_SHIFT: u32 = 12;

/// Guest cache line size; also the code-invalidation granule
pub const CACHE_LINE_SIZE: u32 = 32;

/// BAT translation granule shift (128 KB blocks)
pub const BAT_BLOCK_SHIFT: u32 = 17;
/// BAT translation granule size
pub const BAT_BLOCK_SIZE: u32 = 1 << BAT_BLOCK_SHIFT;
/// Number of entries in a direct-mapped BAT table
pub const BAT_TABLE_ENTRIES: usize = 1 << (32 - BAT_BLOCK_SHIFT);

/// The combined EFB/MMIO hardware window: `(addr & EFB_WINDOW_MASK) == EFB_WINDOW_BASE`
pub const HW_WINDOW_MASK: u32 = 0xF800_0000;
/// Base of the combined EFB/MMIO hardware window
pub const HW_WINDOW_BASE: u32 = 0x0800_0000;
/// Addresses below this inside the hardware window hit the embedded framebuffer
pub const EFB_WINDOW_END: u32 = 0x0C00_0000;
/// MMIO accesses are presented to devices in the 0xCC/0xCD register space
pub const MMIO_REGISTER_BASE: u32 = 0xC000_0000;

/// Gather pipe write window: `(addr & GATHER_PIPE_MASK) == GATHER_PIPE_BASE`
pub const GATHER_PIPE_BASE: u32 = 0x0C00_8000;
/// Mask selecting the gather pipe page
pub const GATHER_PIPE_MASK: u32 = 0xFFFF_F000;
