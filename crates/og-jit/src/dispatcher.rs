//! Dispatcher lookup contract
//!
//! The dispatch loop (native or software) resolves the guest PC against
//! the cache's O(1) start-address index: either there is a finalized
//! block to enter, or the compiler must be invoked and the lookup
//! retried. Entry convention: a block's checked entry re-validates the
//! remaining downcount (and is the only entry reachable from stale
//! linked jumps); the normal entry skips the check and is what the
//! dispatcher itself uses.

use crate::cache::JitBlockCache;

/// Outcome of a dispatch lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTarget {
    /// Enter compiled code at this arena offset (normal entry)
    Execute {
        /// Arena offset of the block's normal entry
        entry: usize,
    },
    /// No block for this address; invoke the compiler
    Compile {
        /// Guest address to compile from
        address: u32,
    },
}

/// Resolve the guest PC to a dispatch decision.
///
/// Only exact block start addresses hit; a PC into the middle of a
/// compiled range compiles a new block, as on the console.
#[inline]
pub fn dispatch(cache: &JitBlockCache, pc: u32) -> DispatchTarget {
    match cache
        .get_block_number_from_start_address(pc)
        .and_then(|block_num| cache.get_compiled_code(block_num))
    {
        Some(entry) => DispatchTarget::Execute { entry },
        None => DispatchTarget::Compile { address: pc },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PortablePatcher;

    #[test]
    fn test_unknown_pc_compiles() {
        let cache = JitBlockCache::new(0x1000, Box::new(PortablePatcher::new()));
        assert_eq!(
            dispatch(&cache, 0x8000_0000),
            DispatchTarget::Compile {
                address: 0x8000_0000
            }
        );
    }
}
