//! JIT block cache for oxidized-gekko
//!
//! Tracks compiled code blocks by guest address, maintains the link graph
//! between block exits and their successors, and destroys blocks whose
//! originating guest memory was overwritten. The native code emitter is
//! external: blocks are opaque byte ranges in a fixed arena, and the only
//! code-level operations the cache performs are binary patches at
//! reserved sites, through an injected capability trait.

pub mod arena;
pub mod bitset;
pub mod block;
pub mod cache;
pub mod dispatcher;
pub mod patch;
pub mod watch;

pub use arena::CodeArena;
pub use bitset::ValidBlockBits;
pub use block::{JitBlock, LinkData};
pub use cache::{JitBlockCache, MAX_BLOCKS};
pub use dispatcher::{dispatch, DispatchTarget};
pub use patch::{EntryPatcher, PortablePatcher, PATCH_SITE_SIZE};
pub use watch::SharedBlockCache;
