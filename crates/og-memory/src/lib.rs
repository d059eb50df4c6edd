//! Guest memory subsystem for oxidized-gekko
//!
//! Owns the backing storage for every memory region of the emulated
//! console (main RAM, locked L1 cache, Wii expansion RAM, the fake-VMEM
//! compatibility region) and provides big-endian typed access to them.
//! Address translation and access routing live in `og-mmu`; this crate is
//! purely physical.

pub mod address_space;
pub mod constants;
pub mod efb;
pub mod gather_pipe;
pub mod memcheck;
pub mod mmio;
pub mod region;
pub mod value;

pub use address_space::{AddressSpace, LogicalRegion, SnapshotSection};
pub use efb::{EfbCoord, FramebufferAccess, NullFramebuffer};
pub use gather_pipe::GatherPipe;
pub use memcheck::{MemCheck, MemChecks};
pub use mmio::{MmioDevice, MmioMap};
pub use region::{RegionDescriptor, RegionFlags, RegionKind};
pub use value::MemValue;
