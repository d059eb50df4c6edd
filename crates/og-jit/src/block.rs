//! Compiled block metadata

/// One patchable exit of a compiled block
#[derive(Debug, Clone)]
pub struct LinkData {
    /// Arena offset of the exit's patch site
    pub exit_offset: usize,
    /// Guest address the exit transfers to
    pub exit_address: u32,
    /// Whether the exit is currently patched to jump directly to the
    /// successor block
    pub linked: bool,
}

/// A compiled code block.
///
/// Entry points are offsets into the cache's code arena. The checked
/// entry re-validates the remaining downcount before running and begins
/// with a patchable site; the normal entry skips the check.
#[derive(Debug, Clone, Default)]
pub struct JitBlock {
    /// Checked entry point (arena offset)
    pub checked_entry: usize,
    /// Normal entry point (arena offset)
    pub normal_entry: usize,
    /// Guest address of the first instruction
    pub start_address: u32,
    /// Generated code size in bytes
    pub code_size: u32,
    /// Number of guest instructions the block was compiled from
    pub original_size: u32,
    /// Block was destroyed and must not be reached through lookups
    pub invalid: bool,
    /// Exit patch sites, in emission order
    pub link_data: Vec<LinkData>,
}

impl JitBlock {
    /// Guest address one past the block's last instruction byte
    #[inline]
    pub fn end_address(&self) -> u32 {
        self.start_address + 4 * self.original_size
    }
}
