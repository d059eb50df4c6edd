//! Block address translation
//!
//! The sixteen BAT register pairs are flattened into two direct-mapped
//! tables (instruction and data), one entry per 128 KB granule of the
//! 32-bit address space. Lookup is a single indexed load; the tables are
//! rebuilt in full whenever a contributing register changes, never on the
//! access path.

use og_memory::constants::{
    BAT_BLOCK_SHIFT, BAT_TABLE_ENTRIES, FAKE_VMEM_BASE, FAKE_VMEM_WINDOW_SIZE, RAM_MASK,
};
use og_memory::{AddressSpace, LogicalRegion};

use crate::registers::{BatLower, BatPair, BatUpper};

/// Valid bit packed into bit 0 of each table entry
const BAT_VALID: u32 = 1;

/// One decoded BAT mapping
#[derive(Debug, Clone, Copy, Default)]
pub struct BatTranslation {
    /// Guest logical base
    pub logical_address: u32,
    /// Mapping size in bytes (zero disables the pair)
    pub logical_size: u32,
    /// Physical base
    pub physical_address: u32,
}

/// A direct-mapped translation table over 128 KB granules
pub struct BatTable {
    entries: Box<[u32]>,
}

impl BatTable {
    /// Create an empty (all-miss) table
    pub fn new() -> Self {
        Self {
            entries: vec![0u32; BAT_TABLE_ENTRIES].into_boxed_slice(),
        }
    }

    /// Clear every entry
    pub fn clear(&mut self) {
        self.entries.fill(0);
    }

    /// O(1) lookup: effective address to physical address
    #[inline]
    pub fn lookup(&self, address: u32) -> Option<u32> {
        let entry = self.entries[(address >> BAT_BLOCK_SHIFT) as usize];
        if entry & BAT_VALID != 0 {
            Some((entry & !BAT_VALID) | (address & ((1 << BAT_BLOCK_SHIFT) - 1)))
        } else {
            None
        }
    }

    /// Write one granule mapping
    fn set_granule(&mut self, logical_block: u32, physical_address: u32) {
        self.entries[logical_block as usize] = physical_address | BAT_VALID;
    }
}

impl Default for BatTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode four register pairs into mappings. A pair whose protection
/// field is zero contributes nothing. Overlaps are not validated; later
/// pairs win per granule.
pub fn compute_bat_translations(pairs: &[BatPair]) -> Vec<BatTranslation> {
    pairs
        .iter()
        .map(|pair| {
            let upper = BatUpper(pair.upper);
            let lower = BatLower(pair.lower);
            let mut t = BatTranslation {
                logical_address: upper.bepi() << BAT_BLOCK_SHIFT,
                logical_size: (upper.bl() + 1) << BAT_BLOCK_SHIFT,
                physical_address: lower.brpn() << BAT_BLOCK_SHIFT,
            };
            if lower.pp() == 0 {
                t.logical_size = 0;
            }
            t
        })
        .collect()
}

/// Flatten decoded mappings into the direct-mapped table
pub fn apply_bat_translations(table: &mut BatTable, translations: &[BatTranslation]) {
    for t in translations {
        let start = t.logical_address >> BAT_BLOCK_SHIFT;
        let granules = t.logical_size >> BAT_BLOCK_SHIFT;
        for i in 0..granules {
            table.set_granule(start + i, t.physical_address + (i << BAT_BLOCK_SHIFT));
        }
    }
}

/// Synthesize the fake-VMEM entries: one 256 MB guest window redirected
/// into the RAM-sized backing at `FAKE_VMEM_BASE`. An approximation for
/// software that expects paging while full MMU emulation is off; the
/// aliasing it produces is intentional and relied upon.
pub fn apply_fake_vmem_window(table: &mut BatTable, window_base: u32) {
    let granules = FAKE_VMEM_WINDOW_SIZE >> BAT_BLOCK_SHIFT;
    for i in 0..granules {
        let logical_block = (window_base >> BAT_BLOCK_SHIFT) + i;
        let physical = FAKE_VMEM_BASE | ((i << BAT_BLOCK_SHIFT) & RAM_MASK);
        table.set_granule(logical_block, physical);
    }
}

/// Push the decoded data-BAT mappings into the address space's logical
/// region table so the logical view stays consistent with the registers.
pub fn sync_logical_regions(space: &mut AddressSpace, translations: &[BatTranslation]) {
    for (slot, t) in translations.iter().enumerate() {
        let region = (t.logical_size != 0).then_some(LogicalRegion {
            logical_base: t.logical_address,
            size: t.logical_size,
            physical_base: t.physical_address,
        });
        space.replace_logical_region(slot, region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use og_memory::constants::{FAKE_VMEM_WINDOWS, RAM_SIZE};

    fn pair(base: u32, granules_minus_1: u32, phys: u32, pp: u32) -> BatPair {
        BatPair {
            upper: base | (granules_minus_1 << 2),
            lower: phys | pp,
        }
    }

    #[test]
    fn test_decode_disabled_pair() {
        let t = compute_bat_translations(&[pair(0x8000_0000, 3, 0, 0)]);
        assert_eq!(t[0].logical_size, 0);
    }

    #[test]
    fn test_flatten_and_lookup() {
        let mut table = BatTable::new();
        let t = compute_bat_translations(&[pair(0x8000_0000, 1, 0x0010_0000, 2)]);
        apply_bat_translations(&mut table, &t);

        // Two 128 KB granules mapped
        assert_eq!(table.lookup(0x8000_0123), Some(0x0010_0123));
        assert_eq!(table.lookup(0x8002_0000), Some(0x0012_0000));
        assert_eq!(table.lookup(0x8004_0000), None);
    }

    #[test]
    fn test_last_write_wins_per_granule() {
        let mut table = BatTable::new();
        let t = compute_bat_translations(&[
            pair(0x8000_0000, 1, 0x0010_0000, 2),
            pair(0x8000_0000, 0, 0x0020_0000, 2),
        ]);
        apply_bat_translations(&mut table, &t);
        assert_eq!(table.lookup(0x8000_0000), Some(0x0020_0000));
        assert_eq!(table.lookup(0x8002_0000), Some(0x0012_0000));
    }

    #[test]
    fn test_fake_vmem_aliases_backing() {
        let mut table = BatTable::new();
        apply_fake_vmem_window(&mut table, FAKE_VMEM_WINDOWS[0]);
        let p = table.lookup(0x4000_0040).unwrap();
        assert_eq!(p & 0xFE00_0000, FAKE_VMEM_BASE);
        // The 256 MB window wraps inside the RAM-sized backing.
        let high = table.lookup(0x4000_0040 + RAM_SIZE).unwrap();
        assert_eq!(p, high);
    }
}
