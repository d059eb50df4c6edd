//! Address translation and hardware access routing
//!
//! Implements the CPU-visible memory pipeline: block address translation
//! (BAT), the hashed-page-table walk with its TLB cache, and the unified
//! access router that dispatches resolved physical addresses to RAM, the
//! locked cache, expansion RAM, the framebuffer window, MMIO, or the
//! gather pipe.

pub mod bat;
pub mod bus;
pub mod registers;
pub mod tlb;
pub mod translate;

pub use bus::{Bus, CodeWatcher, TryReadInstResult};
pub use registers::{BatPair, Exceptions, GekkoRegisters, Msr};
pub use tlb::Tlb;
pub use translate::{AccessKind, Mmu, Translation};
