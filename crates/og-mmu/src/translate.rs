//! Effective-to-physical address translation
//!
//! BAT lookup first (one indexed load), then the TLB-cached hashed page
//! table walk. Failure is a value, not an error: the router decides which
//! guest exception, if any, to latch.

use og_core::config::MmuMode;
use og_memory::constants::{PAGE_MASK, PAGE_SHIFT};
use og_memory::AddressSpace;

use crate::bat::{
    apply_bat_translations, apply_fake_vmem_window, compute_bat_translations, sync_logical_regions,
    BatTable,
};
use crate::registers::{GekkoRegisters, Pte1, Pte2, Sdr1};
use crate::tlb::{Tlb, TlbLookup};

/// What kind of access is being translated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Host-side probe: no exceptions, no side effects
    Probe,
    /// Data read
    Read,
    /// Data write
    Write,
    /// Instruction fetch
    Opcode,
    /// Skip translation entirely
    NoTranslate,
}

/// A successful translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    /// Resolved physical address
    pub address: u32,
    /// Resolved by the BAT fast path
    pub from_bat: bool,
}

/// Page table entry group geometry: 8 slots of 8 bytes
const PTEG_SLOTS: u32 = 8;

/// The address translation context. Owns the BAT tables, the TLB and the
/// architectural registers; explicitly constructed and torn down, so
/// tests can run several instances side by side.
pub struct Mmu {
    /// Architectural register state
    pub regs: GekkoRegisters,
    dbat_table: BatTable,
    ibat_table: BatTable,
    tlb: Tlb,
    mode: MmuMode,
}

impl Mmu {
    /// Create a translation context for the given MMU mode
    pub fn new(mode: MmuMode) -> Self {
        Self {
            regs: GekkoRegisters::default(),
            dbat_table: BatTable::new(),
            ibat_table: BatTable::new(),
            tlb: Tlb::new(),
            mode,
        }
    }

    /// Whether full hashed-page-table emulation is enabled
    pub fn full_mmu(&self) -> bool {
        self.mode == MmuMode::Full
    }

    /// Whether the fake-VMEM compatibility mapping is active
    pub fn fake_vmem(&self) -> bool {
        self.mode == MmuMode::FakeVmem
    }

    /// TLB statistics (hits, misses)
    pub fn tlb_stats(&self) -> (u64, u64) {
        self.tlb.stats()
    }

    // ------------------------------------------------------------------
    // Register write notifications

    /// A data BAT register pair changed: rebuild the data table and keep
    /// the address space's logical view in step.
    pub fn dbat_updated(&mut self, space: &mut AddressSpace) {
        self.dbat_table.clear();
        let count = if self.regs.extended_bats { 8 } else { 4 };
        let translations = compute_bat_translations(&self.regs.dbat[..count]);
        apply_bat_translations(&mut self.dbat_table, &translations);
        if self.fake_vmem() {
            for window in og_memory::constants::FAKE_VMEM_WINDOWS {
                apply_fake_vmem_window(&mut self.dbat_table, window);
            }
        }
        sync_logical_regions(space, &translations);
    }

    /// An instruction BAT register pair changed
    pub fn ibat_updated(&mut self) {
        self.ibat_table.clear();
        let count = if self.regs.extended_bats { 8 } else { 4 };
        let translations = compute_bat_translations(&self.regs.ibat[..count]);
        apply_bat_translations(&mut self.ibat_table, &translations);
    }

    /// SDR1 was written: decode the page table base and hash mask.
    ///
    /// The mask must be a contiguous run of low bits and the base must be
    /// aligned to it; malformed values leave the previous decode in place
    /// (hardware-permissive, no validation error).
    pub fn sdr_updated(&mut self, sdr1: u32) {
        let sdr1 = Sdr1(sdr1);
        let htabmask = sdr1.htabmask();
        let mut x = 1u32;
        let mut xx = 0u32;
        let mut n = 0;
        while htabmask & x != 0 && n < 9 {
            n += 1;
            xx |= x;
            x <<= 1;
        }
        if htabmask & !xx != 0 {
            return;
        }
        let htaborg = sdr1.htaborg();
        if htaborg & xx != 0 {
            return;
        }
        self.regs.pagetable_base = htaborg << 16;
        self.regs.pagetable_hashmask = (xx << 10) | 0x3FF;
        self.tlb.flush();
        tracing::debug!(
            "Page table at 0x{:08x}, hashmask 0x{:05x}",
            self.regs.pagetable_base,
            self.regs.pagetable_hashmask
        );
    }

    /// Invalidate any cached translation for one page (guest `tlbie`)
    pub fn invalidate_tlb_entry(&mut self, address: u32) {
        self.tlb.invalidate_entry(address);
    }

    /// Drop every cached translation
    pub fn flush_tlb(&mut self) {
        self.tlb.flush();
    }

    // ------------------------------------------------------------------
    // Translation

    /// Translate an effective address, BAT first, page table second.
    #[inline]
    pub fn translate(
        &mut self,
        space: &mut AddressSpace,
        address: u32,
        kind: AccessKind,
    ) -> Option<Translation> {
        let table = if kind == AccessKind::Opcode {
            &self.ibat_table
        } else {
            &self.dbat_table
        };
        if let Some(physical) = table.lookup(address) {
            return Some(Translation {
                address: physical,
                from_bat: true,
            });
        }
        self.translate_page_address(space, address, kind)
    }

    /// Hashed page table walk with TLB caching.
    fn translate_page_address(
        &mut self,
        space: &mut AddressSpace,
        address: u32,
        kind: AccessKind,
    ) -> Option<Translation> {
        let tlb_result = self.tlb.lookup(kind, address);
        if let TlbLookup::Found(physical) = tlb_result {
            return Some(Translation {
                address: physical,
                from_bat: false,
            });
        }

        let sr = self.regs.segment_for(address);
        let offset = address & PAGE_MASK;
        let page_index = (address >> PAGE_SHIFT) & 0xFFFF;
        let vsid = sr.vsid();
        let api = (address >> 22) & 0x3F;

        let mut hash = vsid ^ page_index;
        let mut pte1 = Pte1::compose(vsid, api);

        for hash_func in 0..2 {
            if hash_func == 1 {
                hash = !hash;
                pte1 = pte1.with_secondary_hash();
            }

            let mut pteg_addr =
                ((hash & self.regs.pagetable_hashmask) << 6) | self.regs.pagetable_base;

            for _ in 0..PTEG_SLOTS {
                if space.read_phys::<u32>(pteg_addr) == Some(pte1.0) {
                    let mut pte2 = Pte2(space.read_phys::<u32>(pteg_addr + 4)?);

                    match kind {
                        AccessKind::Probe | AccessKind::NoTranslate => {}
                        AccessKind::Read | AccessKind::Opcode => pte2.set_referenced(),
                        AccessKind::Write => {
                            pte2.set_referenced();
                            pte2.set_changed();
                        }
                    }

                    if kind != AccessKind::Probe {
                        space.write_phys::<u32>(pteg_addr + 4, pte2.0);
                    }

                    // The TLB entry was already refreshed in place when
                    // this walk was triggered by a change-bit update.
                    if tlb_result != TlbLookup::UpdateChanged {
                        self.tlb.update(kind, pte2, address);
                    }

                    return Some(Translation {
                        address: (pte2.rpn() << PAGE_SHIFT) | offset,
                        from_bat: false,
                    });
                }
                pteg_addr = pteg_addr.wrapping_add(8);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use og_core::config::ConsoleVariant;
    use crate::registers::BatPair;

    fn full_mmu() -> (Mmu, AddressSpace) {
        let mmu = Mmu::new(MmuMode::Full);
        let space = AddressSpace::new(ConsoleVariant::GameCube, false);
        (mmu, space)
    }

    /// Install a PTE for `address` in the primary hash slot and return
    /// the PTEG address used.
    fn install_pte(mmu: &mut Mmu, space: &mut AddressSpace, address: u32, rpn: u32) -> u32 {
        let vsid = mmu.regs.segment_for(address).vsid();
        let page_index = (address >> PAGE_SHIFT) & 0xFFFF;
        let api = (address >> 22) & 0x3F;
        let hash = vsid ^ page_index;
        let pteg_addr = ((hash & mmu.regs.pagetable_hashmask) << 6) | mmu.regs.pagetable_base;
        space.write_phys::<u32>(pteg_addr, Pte1::compose(vsid, api).0);
        space.write_phys::<u32>(pteg_addr + 4, rpn << PAGE_SHIFT);
        pteg_addr
    }

    #[test]
    fn test_page_walk_and_tlb_fill() {
        let (mut mmu, mut space) = full_mmu();
        mmu.sdr_updated(0x0010_0000); // table at 0x100000, minimal mask
        mmu.regs.sr[0] = 0x0000_0123;

        install_pte(&mut mmu, &mut space, 0x0000_5000, 0x0000_0ABC);

        let t = mmu
            .translate(&mut space, 0x0000_5678, AccessKind::Read)
            .unwrap();
        assert_eq!(t.address, (0xABC << 12) | 0x678);
        assert!(!t.from_bat);

        // Second access is served by the TLB.
        let (hits_before, _) = mmu.tlb_stats();
        mmu.translate(&mut space, 0x0000_5678, AccessKind::Read)
            .unwrap();
        assert_eq!(mmu.tlb_stats().0, hits_before + 1);
    }

    #[test]
    fn test_referenced_bit_persisted() {
        let (mut mmu, mut space) = full_mmu();
        mmu.sdr_updated(0x0010_0000);
        mmu.regs.sr[0] = 0x0000_0042;

        let pteg = install_pte(&mut mmu, &mut space, 0x0000_3000, 0x0000_0111);
        mmu.translate(&mut space, 0x0000_3000, AccessKind::Read)
            .unwrap();

        let pte2 = Pte2(space.read_phys::<u32>(pteg + 4).unwrap());
        assert!(pte2.referenced());
        assert!(!pte2.changed());
    }

    #[test]
    fn test_probe_has_no_side_effects() {
        let (mut mmu, mut space) = full_mmu();
        mmu.sdr_updated(0x0010_0000);
        mmu.regs.sr[0] = 0x0000_0042;

        let pteg = install_pte(&mut mmu, &mut space, 0x0000_3000, 0x0000_0111);
        mmu.translate(&mut space, 0x0000_3000, AccessKind::Probe)
            .unwrap();

        let pte2 = Pte2(space.read_phys::<u32>(pteg + 4).unwrap());
        assert!(!pte2.referenced());
        // Probes don't populate the TLB either.
        assert_eq!(mmu.tlb_stats().0, 0);
    }

    #[test]
    fn test_translation_failure_is_none() {
        let (mut mmu, mut space) = full_mmu();
        mmu.sdr_updated(0x0010_0000);
        assert!(mmu
            .translate(&mut space, 0x0000_9000, AccessKind::Read)
            .is_none());
    }

    #[test]
    fn test_bat_beats_page_table() {
        let (mut mmu, mut space) = full_mmu();
        mmu.sdr_updated(0x0010_0000);
        mmu.regs.dbat[0] = BatPair {
            upper: 0x0000_0000 | (0 << 2),
            lower: 0x0040_0000 | 2,
        };
        mmu.dbat_updated(&mut space);

        let t = mmu
            .translate(&mut space, 0x0000_0123, AccessKind::Read)
            .unwrap();
        assert!(t.from_bat);
        assert_eq!(t.address, 0x0040_0123);
    }

    #[test]
    fn test_malformed_sdr1_ignored() {
        let (mut mmu, _space) = full_mmu();
        mmu.sdr_updated(0x0010_0000);
        let base = mmu.regs.pagetable_base;
        // Non-contiguous mask: ignored, previous decode stays.
        mmu.sdr_updated(0x0020_0105);
        assert_eq!(mmu.regs.pagetable_base, base);
    }
}
