//! The block cache
//!
//! Two indices cover the two access patterns: a paged direct table from
//! guest start address to block number serves dispatch in O(1), and an
//! ordered map keyed by (end address, start address) serves range
//! invalidation. Both must stay consistent with the valid-granule bitset;
//! disagreements are cache bugs, reported loudly.

use std::collections::{BTreeMap, BTreeSet};

use og_memory::constants::CACHE_LINE_SIZE;

use crate::arena::CodeArena;
use crate::bitset::ValidBlockBits;
use crate::block::{JitBlock, LinkData};
use crate::patch::EntryPatcher;

/// Fixed block table capacity; exceeding it triggers a full reset
pub const MAX_BLOCKS: usize = 65536 * 2;

/// Entry marker for unindexed start addresses
const INDEX_INVALID: u32 = u32::MAX;
/// Start-index page geometry: one page per 16 KB of guest addresses
const INDEX_PAGE_SHIFT: u32 = 14;
const INDEX_PAGE_ENTRIES: usize = 1 << 12;
const INDEX_PAGE_COUNT: usize = 1 << 18;

/// Paged direct map: guest instruction start address to block number
struct StartAddressIndex {
    pages: Vec<Option<Box<[u32; INDEX_PAGE_ENTRIES]>>>,
}

impl StartAddressIndex {
    fn new() -> Self {
        let mut pages = Vec::with_capacity(INDEX_PAGE_COUNT);
        pages.resize_with(INDEX_PAGE_COUNT, || None);
        Self { pages }
    }

    #[inline]
    fn slot(address: u32) -> (usize, usize) {
        (
            (address >> INDEX_PAGE_SHIFT) as usize,
            ((address >> 2) as usize) & (INDEX_PAGE_ENTRIES - 1),
        )
    }

    fn set(&mut self, address: u32, block_num: u32) {
        let (page, entry) = Self::slot(address);
        let page = self.pages[page]
            .get_or_insert_with(|| Box::new([INDEX_INVALID; INDEX_PAGE_ENTRIES]));
        page[entry] = block_num;
    }

    fn clear(&mut self, address: u32) {
        let (page, entry) = Self::slot(address);
        if let Some(page) = &mut self.pages[page] {
            page[entry] = INDEX_INVALID;
        }
    }

    #[inline]
    fn get(&self, address: u32) -> Option<u32> {
        let (page, entry) = Self::slot(address);
        let value = self.pages[page].as_ref()?[entry];
        (value != INDEX_INVALID).then_some(value)
    }

    fn clear_all(&mut self) {
        for page in &mut self.pages {
            *page = None;
        }
    }
}

/// The JIT block cache
pub struct JitBlockCache {
    blocks: Vec<JitBlock>,
    arena: CodeArena,
    patcher: Box<dyn EntryPatcher + Send>,
    /// (end address, start address) -> block number, for range queries
    block_map: BTreeMap<(u32, u32), u32>,
    /// Exit target address -> blocks that jump there
    links_to: BTreeMap<u32, Vec<u32>>,
    start_index: StartAddressIndex,
    valid_bits: ValidBlockBits,
    /// Addresses the emitter compiled as FIFO-write fast paths; stale
    /// once the code at them changes
    fast_write_hints: BTreeSet<u32>,
}

impl JitBlockCache {
    /// Create a cache with the given code arena capacity
    pub fn new(code_capacity: usize, patcher: Box<dyn EntryPatcher + Send>) -> Self {
        Self {
            blocks: Vec::with_capacity(MAX_BLOCKS),
            arena: CodeArena::new(code_capacity),
            patcher,
            block_map: BTreeMap::new(),
            links_to: BTreeMap::new(),
            start_index: StartAddressIndex::new(),
            valid_bits: ValidBlockBits::new(),
            fast_write_hints: BTreeSet::new(),
        }
    }

    /// Number of allocated blocks (including destroyed ones)
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// The block table is full; callers must `clear()` before allocating
    pub fn is_full(&self) -> bool {
        self.blocks.len() >= MAX_BLOCKS - 1
    }

    /// Borrow a block
    pub fn block(&self, block_num: u32) -> &JitBlock {
        &self.blocks[block_num as usize]
    }

    /// Borrow a block mutably (the compiler fills entries and link data
    /// between `allocate_block` and `finalize_block`)
    pub fn block_mut(&mut self, block_num: u32) -> &mut JitBlock {
        &mut self.blocks[block_num as usize]
    }

    /// Append generated code to the arena; returns its base offset
    pub fn emit_code(&mut self, code: &[u8]) -> Option<usize> {
        self.arena.emit(code)
    }

    /// Borrow emitted code
    pub fn code(&self, offset: usize, len: usize) -> &[u8] {
        self.arena.code(offset, len)
    }

    // ------------------------------------------------------------------
    // Lifecycle

    /// Reserve a block slot for code starting at `start_address`.
    ///
    /// The slot is fixed for the session; it is never reused except by a
    /// full `clear`/`reset`. Capacity must be checked via `is_full`
    /// before calling.
    pub fn allocate_block(&mut self, start_address: u32) -> u32 {
        let block_num = self.blocks.len() as u32;
        self.blocks.push(JitBlock {
            start_address,
            ..JitBlock::default()
        });
        block_num
    }

    /// Register a populated block: marks its guest range valid, indexes
    /// it, and (optionally) links it into the graph both ways.
    pub fn finalize_block(&mut self, block_num: u32, block_link: bool) {
        let (start_address, end_address, granules, exits) = {
            let b = &self.blocks[block_num as usize];
            (
                b.start_address,
                b.end_address(),
                (b.original_size + 7) / 8,
                b.link_data
                    .iter()
                    .map(|e| e.exit_address)
                    .collect::<Vec<_>>(),
            )
        };

        // One live block per start address.
        if let Some(prev) = self.start_index.get(start_address) {
            if prev != block_num && !self.blocks[prev as usize].invalid {
                tracing::error!(
                    "Block {} already claims start address 0x{:08x}; destroying it",
                    prev,
                    start_address
                );
                self.remove_from_block_map(prev);
                self.destroy_block(prev, true);
            }
        }

        for i in 0..granules {
            self.valid_bits.set(start_address / CACHE_LINE_SIZE + i);
        }

        self.block_map
            .insert((end_address - 1, start_address), block_num);
        self.start_index.set(start_address, block_num);

        if block_link {
            for exit_address in exits {
                self.links_to.entry(exit_address).or_default().push(block_num);
            }
            self.link_block(block_num);
        }

        tracing::trace!(
            "Finalized block {} for 0x{:08x}..0x{:08x}",
            block_num,
            start_address,
            end_address
        );
    }

    /// O(1) lookup by exact block start address
    #[inline]
    pub fn get_block_number_from_start_address(&self, address: u32) -> Option<u32> {
        self.start_index.get(address)
    }

    /// Normal entry point of a finalized block, for the dispatcher
    pub fn get_compiled_code(&self, block_num: u32) -> Option<usize> {
        let b = &self.blocks[block_num as usize];
        (!b.invalid).then_some(b.normal_entry)
    }

    // ------------------------------------------------------------------
    // Linking

    /// Patch this block's unlinked exits to any already-compiled
    /// successors
    fn link_block_exits(&mut self, block_num: u32) {
        if self.blocks[block_num as usize].invalid {
            // This block is dead. Don't relink it.
            return;
        }
        for i in 0..self.blocks[block_num as usize].link_data.len() {
            let LinkData {
                exit_offset,
                exit_address,
                linked,
            } = self.blocks[block_num as usize].link_data[i].clone();
            if linked {
                continue;
            }
            let Some(dest) = self.start_index.get(exit_address) else {
                continue;
            };
            let target = self.blocks[dest as usize].checked_entry;
            let site = self.arena.site_mut(exit_offset, self.patcher.site_size());
            self.patcher.patch_link_jump(site, target);
            self.blocks[block_num as usize].link_data[i].linked = true;
        }
    }

    /// Link both directions: this block's exits, and the exits of every
    /// block already waiting on this block's start address
    fn link_block(&mut self, block_num: u32) {
        self.link_block_exits(block_num);
        let start_address = self.blocks[block_num as usize].start_address;
        let sources = match self.links_to.get(&start_address) {
            Some(sources) => sources.clone(),
            None => return,
        };
        for source in sources {
            self.link_block_exits(source);
        }
    }

    /// Mark every exit jumping to this block as unlinked again
    fn unlink_block(&mut self, block_num: u32) {
        let start_address = self.blocks[block_num as usize].start_address;
        let Some(sources) = self.links_to.remove(&start_address) else {
            return;
        };
        for source in sources {
            for e in &mut self.blocks[source as usize].link_data {
                if e.exit_address == start_address {
                    e.linked = false;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Destruction

    /// Destroy one block: unlink it, drop it from the fast index, and
    /// patch its checked entry to redirect stale callers back to the
    /// dispatcher. The slot stays allocated and marked invalid.
    pub fn destroy_block(&mut self, block_num: u32, invalidate: bool) {
        if block_num as usize >= self.blocks.len() {
            tracing::error!("DestroyBlock: invalid block number {}", block_num);
            return;
        }
        if self.blocks[block_num as usize].invalid {
            if invalidate {
                tracing::error!("Invalidating invalid block {}", block_num);
            }
            return;
        }
        self.blocks[block_num as usize].invalid = true;

        self.unlink_block(block_num);

        let (start_address, checked_entry) = {
            let b = &self.blocks[block_num as usize];
            (b.start_address, b.checked_entry)
        };
        self.start_index.clear(start_address);

        // Spurious entrances from previously linked blocks can only come
        // through the checked entry.
        let site = self.arena.site_mut(checked_entry, self.patcher.site_size());
        self.patcher.patch_destroy_redirect(site, start_address);
    }

    fn remove_from_block_map(&mut self, block_num: u32) {
        let b = &self.blocks[block_num as usize];
        let key = (b.end_address() - 1, b.start_address);
        self.block_map.remove(&key);
    }

    /// Destroy every finalized block whose guest range overlaps
    /// `[address, address + length)`.
    ///
    /// `forced` distinguishes an explicit flush request from invalidation
    /// caused by an actual guest write; only the latter purges FIFO
    /// fast-path hints, since only then has the code identity changed.
    pub fn invalidate_icache(&mut self, address: u32, length: u32, forced: bool) {
        let mut destroy_block = true;
        if length == CACHE_LINE_SIZE {
            let granule = address / CACHE_LINE_SIZE;
            if !self.valid_bits.test(granule) {
                destroy_block = false;
            } else {
                self.valid_bits.clear(granule);
            }
        }

        if destroy_block {
            let end = address.saturating_add(length);
            // Works under the assumption that any two overlapping blocks
            // end at the same address.
            let mut doomed = Vec::new();
            for (&key, &block_num) in self.block_map.range((address, 0u32)..) {
                if key.1 >= end {
                    break;
                }
                doomed.push((key, block_num));
            }
            for (key, block_num) in doomed {
                let (start_address, granules) = {
                    let b = &self.blocks[block_num as usize];
                    (b.start_address, (b.original_size + 7) / 8)
                };
                for i in 0..granules {
                    self.valid_bits.clear(start_address / CACHE_LINE_SIZE + i);
                }
                self.destroy_block(block_num, true);
                self.block_map.remove(&key);
            }
        }

        if !forced {
            let stale: Vec<u32> = self
                .fast_write_hints
                .range(address..address.saturating_add(length))
                .copied()
                .collect();
            for hint in stale {
                self.fast_write_hints.remove(&hint);
            }
        }
    }

    /// Guest-write tap: cheap granule prefilter in front of
    /// `invalidate_icache`, so ordinary stores outside compiled ranges
    /// cost two bit tests.
    pub fn write_tap(&mut self, address: u32, size: u32) {
        let first = address / CACHE_LINE_SIZE;
        let last = address.saturating_add(size.max(1) - 1) / CACHE_LINE_SIZE;
        if (first..=last).any(|granule| self.valid_bits.test(granule)) {
            self.invalidate_icache(address, size, false);
        }
    }

    // ------------------------------------------------------------------
    // FIFO fast-path hints

    /// Record that the emitter compiled `address` as a FIFO-write fast
    /// path
    pub fn add_fast_write_hint(&mut self, address: u32) {
        self.fast_write_hints.insert(address);
    }

    /// Whether the hint is still valid
    pub fn has_fast_write_hint(&self, address: u32) -> bool {
        self.fast_write_hints.contains(&address)
    }

    // ------------------------------------------------------------------
    // Whole-cache teardown

    /// Destroy every block and empty every index. Called when the cache
    /// fills up and when loading a saved state.
    pub fn clear(&mut self) {
        tracing::debug!("Clearing block cache ({} blocks)", self.blocks.len());
        for block_num in 0..self.blocks.len() as u32 {
            self.destroy_block(block_num, false);
        }
        self.blocks.clear();
        self.links_to.clear();
        self.block_map.clear();
        self.valid_bits.clear_all();
        self.start_index.clear_all();
        self.fast_write_hints.clear();
    }

    /// `clear`, plus tear down and reinitialize the backing allocations
    /// (used on capacity exhaustion)
    pub fn reset(&mut self) {
        self.clear();
        self.arena.reset();
    }
}
