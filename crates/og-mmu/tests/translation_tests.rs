//! Translation pipeline and access routing tests

use std::sync::{Arc, Mutex};

use og_core::config::{Config, MmuMode};
use og_memory::constants::PAGE_SHIFT;
use og_memory::{FramebufferAccess, NullFramebuffer};
use og_mmu::registers::{Pte1, Pte2, DSISR_PAGE_FAULT, DSISR_STORE};
use og_mmu::{AccessKind, BatPair, Bus, Exceptions, Msr};

const MSR_TRANSLATE: Msr = Msr(0x30); // IR | DR

fn full_mmu_bus() -> Bus {
    let mut config = Config::default();
    config.system.mmu = MmuMode::Full;
    let mut bus = Bus::new(&config, Box::new(NullFramebuffer::new()));
    bus.mmu.sdr_updated(0x0010_0000); // page table at 0x100000
    bus
}

/// Install a page table entry for `virtual_page << 12` mapping to
/// `physical_page << 12`, in the primary or secondary hash slot.
fn install_pte(bus: &mut Bus, virtual_address: u32, physical_page: u32, secondary: bool) {
    let vsid = bus.mmu.regs.segment_for(virtual_address).vsid();
    let page_index = (virtual_address >> PAGE_SHIFT) & 0xFFFF;
    let api = (virtual_address >> 22) & 0x3F;

    let mut hash = vsid ^ page_index;
    let mut pte1 = Pte1::compose(vsid, api);
    if secondary {
        hash = !hash;
        pte1 = pte1.with_secondary_hash();
    }

    let pteg_addr =
        ((hash & bus.mmu.regs.pagetable_hashmask) << 6) | bus.mmu.regs.pagetable_base;
    bus.space.write_phys::<u32>(pteg_addr, pte1.0);
    bus.space
        .write_phys::<u32>(pteg_addr + 4, physical_page << PAGE_SHIFT);
}

fn pte2_for(bus: &Bus, virtual_address: u32, secondary: bool) -> Pte2 {
    let vsid = bus.mmu.regs.segment_for(virtual_address).vsid();
    let page_index = (virtual_address >> PAGE_SHIFT) & 0xFFFF;
    let mut hash = vsid ^ page_index;
    if secondary {
        hash = !hash;
    }
    let pteg_addr =
        ((hash & bus.mmu.regs.pagetable_hashmask) << 6) | bus.mmu.regs.pagetable_base;
    Pte2(bus.space.read_phys::<u32>(pteg_addr + 4).unwrap())
}

#[test]
fn test_bat_round_trip() {
    let mut bus = full_mmu_bus();
    bus.mmu.regs.msr = MSR_TRANSLATE;
    // 256 KB at 0x80000000 -> physical 0x00100000
    bus.mmu.regs.dbat[0] = BatPair {
        upper: 0x8000_0000 | (1 << 2),
        lower: 0x0010_0000 | 2,
    };
    bus.mmu.dbat_updated(&mut bus.space);

    for offset in [0u32, 0x1234, 0x3_FFFC] {
        bus.write_u32(0x8000_0000 + offset, offset ^ 0x5555_AAAA);
    }
    for offset in [0u32, 0x1234, 0x3_FFFC] {
        assert_eq!(
            bus.space.read_phys::<u32>(0x0010_0000 + offset),
            Some(offset ^ 0x5555_AAAA)
        );
        assert_eq!(bus.read_u32(0x8000_0000 + offset), offset ^ 0x5555_AAAA);
    }

    // Outside the configured window the BAT misses and, with an empty
    // page table, translation fails.
    let t = bus
        .mmu
        .translate(&mut bus.space, 0x8004_0000, AccessKind::Probe);
    assert!(t.is_none());
}

#[test]
fn test_tlb_serves_repeat_translations() {
    let mut bus = full_mmu_bus();
    bus.mmu.regs.msr = MSR_TRANSLATE;
    bus.mmu.regs.sr[0] = 0x0000_0123;
    install_pte(&mut bus, 0x0000_5000, 0x0ABC, false);

    assert_eq!(bus.read_u32(0x0000_5000), 0);
    let (hits_first, misses_first) = bus.mmu.tlb_stats();
    assert_eq!(hits_first, 0);
    assert_eq!(misses_first, 1);

    // Same physical address on every call, served from the TLB.
    for _ in 0..3 {
        bus.read_u32(0x0000_5008);
    }
    let (hits, misses) = bus.mmu.tlb_stats();
    assert_eq!(hits, 3);
    assert_eq!(misses, misses_first);
}

#[test]
fn test_change_bit_persistence() {
    let mut bus = full_mmu_bus();
    bus.mmu.regs.msr = MSR_TRANSLATE;
    bus.mmu.regs.sr[0] = 0x0000_0042;
    install_pte(&mut bus, 0x0000_3000, 0x0111, false);

    // Prime the TLB with a read: R set, C clear.
    bus.read_u32(0x0000_3000);
    let pte2 = pte2_for(&bus, 0x0000_3000, false);
    assert!(pte2.referenced());
    assert!(!pte2.changed());

    // A write must persist the change bit to the backing entry.
    bus.write_u32(0x0000_3000, 0xFEED_FACE);
    let pte2 = pte2_for(&bus, 0x0000_3000, false);
    assert!(pte2.changed());

    // And the cached copy carries it too: the next write is a plain TLB
    // hit, not a re-walk.
    let (hits_before, misses_before) = bus.mmu.tlb_stats();
    bus.write_u32(0x0000_3004, 1);
    let (hits, misses) = bus.mmu.tlb_stats();
    assert_eq!(hits, hits_before + 1);
    assert_eq!(misses, misses_before);
}

#[test]
fn test_secondary_hash_fallback() {
    let mut bus = full_mmu_bus();
    bus.mmu.regs.msr = MSR_TRANSLATE;
    bus.mmu.regs.sr[0] = 0x0000_0077;
    install_pte(&mut bus, 0x0000_6000, 0x0222, true);

    let t = bus
        .mmu
        .translate(&mut bus.space, 0x0000_6123, AccessKind::Read)
        .unwrap();
    assert_eq!(t.address, (0x0222 << PAGE_SHIFT) | 0x123);
    assert!(!t.from_bat);
}

#[test]
fn test_unaligned_cross_page_read() {
    let mut bus = full_mmu_bus();
    bus.mmu.regs.msr = MSR_TRANSLATE;
    bus.mmu.regs.sr[0] = 0x0000_0009;
    // Two virtually adjacent pages backed by non-contiguous physical
    // pages.
    install_pte(&mut bus, 0x0001_0000, 0x0005, false);
    install_pte(&mut bus, 0x0001_1000, 0x0009, false);

    bus.space.write_phys::<u16>(0x5FFE, 0xAABB);
    bus.space.write_phys::<u16>(0x9000, 0xCCDD);

    // 4-byte read 2 bytes before the boundary assembles from both pages.
    assert_eq!(bus.read_u32(0x0001_0FFE), 0xAABB_CCDD);
}

#[test]
fn test_unaligned_cross_page_write() {
    let mut bus = full_mmu_bus();
    bus.mmu.regs.msr = MSR_TRANSLATE;
    bus.mmu.regs.sr[0] = 0x0000_0009;
    install_pte(&mut bus, 0x0001_0000, 0x0005, false);
    install_pte(&mut bus, 0x0001_1000, 0x0009, false);

    bus.write_u32(0x0001_0FFE, 0x1122_3344);
    assert_eq!(bus.space.read_phys::<u16>(0x5FFE), Some(0x1122));
    assert_eq!(bus.space.read_phys::<u16>(0x9000), Some(0x3344));
}

#[test]
fn test_dsi_latched_on_failed_data_access() {
    let mut bus = full_mmu_bus();
    bus.mmu.regs.msr = MSR_TRANSLATE;

    assert_eq!(bus.read_u32(0x0000_9000), 0);
    assert!(bus.mmu.regs.exceptions.contains(Exceptions::DSI));
    assert_eq!(bus.mmu.regs.dar, 0x0000_9000);
    assert_eq!(bus.mmu.regs.dsisr, DSISR_PAGE_FAULT);

    bus.mmu.regs.exceptions = Exceptions::empty();
    bus.write_u32(0x0000_9000, 1);
    assert!(bus.mmu.regs.exceptions.contains(Exceptions::DSI));
    assert_eq!(bus.mmu.regs.dsisr, DSISR_PAGE_FAULT | DSISR_STORE);
}

#[test]
fn test_probe_never_latches_exceptions() {
    let mut bus = full_mmu_bus();
    bus.mmu.regs.msr = MSR_TRANSLATE;

    assert_eq!(bus.host_read_u32(0x0000_9000), 0);
    assert!(bus.mmu.regs.exceptions.is_empty());
}

#[test]
fn test_isi_on_failed_fetch() {
    let mut bus = full_mmu_bus();
    bus.mmu.regs.msr = MSR_TRANSLATE;

    let result = bus.try_read_instruction(0x0000_9000);
    assert!(!result.valid);
    // The try contract leaves the exception to the caller.
    assert!(bus.mmu.regs.exceptions.is_empty());

    assert_eq!(bus.read_opcode(0x0000_9000), 0);
    assert!(bus.mmu.regs.exceptions.contains(Exceptions::ISI));
    assert_eq!(bus.mmu.regs.npc, 0x0000_9000);
}

#[test]
fn test_fetch_uses_instruction_bats() {
    let mut bus = full_mmu_bus();
    bus.mmu.regs.msr = MSR_TRANSLATE;
    bus.mmu.regs.ibat[0] = BatPair {
        upper: 0x8000_0000 | (0 << 2),
        lower: 0x0000_0000 | 2,
    };
    bus.mmu.ibat_updated();

    bus.space.write_phys::<u32>(0x0000_0100, 0x4E80_0020);
    let result = bus.try_read_instruction(0x8000_0100);
    assert!(result.valid);
    assert!(result.from_bat);
    assert_eq!(result.hex, 0x4E80_0020);

    // Data BATs are empty: the same address misses for data access.
    assert!(bus
        .mmu
        .translate(&mut bus.space, 0x8000_0100, AccessKind::Probe)
        .is_none());
}

#[test]
fn test_unresolvable_address_soft_fails() {
    let mut bus = full_mmu_bus();
    // Translation off: the address is used physically and matches no
    // region. The read yields zero, nothing is latched, nothing panics.
    assert_eq!(bus.read_u32(0x2700_0000), 0);
    bus.write_u32(0x2700_0000, 0x1234_5678);
    assert!(bus.mmu.regs.exceptions.is_empty());
}

#[derive(Default)]
struct RecordingFramebuffer {
    pokes: Arc<Mutex<Vec<(u32, u32, u32, bool)>>>,
}

impl FramebufferAccess for RecordingFramebuffer {
    fn peek_color(&self, x: u32, y: u32) -> u32 {
        (y << 16) | x
    }

    fn peek_depth(&self, _x: u32, _y: u32) -> u32 {
        0x00FF_FFFF
    }

    fn poke_color(&mut self, x: u32, y: u32, value: u32) {
        self.pokes.lock().unwrap().push((x, y, value, false));
    }

    fn poke_depth(&mut self, x: u32, y: u32, value: u32) {
        self.pokes.lock().unwrap().push((x, y, value, true));
    }
}

#[test]
fn test_efb_window_routes_to_framebuffer() {
    let pokes = Arc::new(Mutex::new(Vec::new()));
    let fb = RecordingFramebuffer {
        pokes: Arc::clone(&pokes),
    };
    let config = Config::default();
    let mut bus = Bus::new(&config, Box::new(fb));

    // Color peek at (x=5, y=17)
    let address = 0x0800_0000 | (17 << 12) | (5 << 2);
    assert_eq!(bus.read_u32(address), (17 << 16) | 5);
    // Depth peek
    assert_eq!(bus.read_u32(0x0840_0000), 0x00FF_FFFF);

    bus.write_u32(address, 0xAABB_CCDD);
    assert_eq!(pokes.lock().unwrap()[0], (5, 17, 0xAABB_CCDD, false));
}

#[test]
fn test_gather_pipe_window() {
    let config = Config::default();
    let mut bus = Bus::new(&config, Box::new(NullFramebuffer::new()));
    bus.gather_pipe.set_fifo(0x8000, 0x9000, 0x8000);

    for i in 0..8u32 {
        bus.write_u32(0x0C00_8000, i);
    }
    assert_eq!(bus.gather_pipe.write_pointer(), 0x8020);
    assert_eq!(bus.space.read_phys::<u32>(0x8000), Some(0));
    assert_eq!(bus.space.read_phys::<u32>(0x801C), Some(7));
}

#[test]
fn test_clear_cache_line() {
    let config = Config::default();
    let mut bus = Bus::new(&config, Box::new(NullFramebuffer::new()));
    for i in 0..40u32 {
        bus.write_u8(0x1000 + i, 0xFF);
    }
    bus.clear_cache_line(0x1000);
    for i in 0..32u32 {
        assert_eq!(bus.read_u8(0x1000 + i), 0);
    }
    // The next line is untouched.
    assert_eq!(bus.read_u8(0x1020), 0xFF);
}

#[test]
fn test_lc_dma_round_trip() {
    let config = Config::default();
    let mut bus = Bus::new(&config, Box::new(NullFramebuffer::new()));

    for i in 0..64u32 {
        bus.write_u8(0x2000 + i, i as u8);
    }
    bus.dma_memory_to_lc(0x100, 0x2000, 2);
    bus.dma_lc_to_memory(0x4000, 0x100, 2);
    for i in 0..64u32 {
        assert_eq!(bus.read_u8(0x4000 + i), i as u8);
    }
}

#[test]
fn test_is_optimizable_ram_address() {
    let config = Config::default();
    let mut bus = Bus::new(&config, Box::new(NullFramebuffer::new()));

    // Requires data translation.
    assert!(!bus.is_optimizable_ram_address(0x8000_0000));
    bus.mmu.regs.msr = MSR_TRANSLATE;
    assert!(bus.is_optimizable_ram_address(0x8000_0000));
    assert!(bus.is_optimizable_ram_address(0xC000_1234));
    assert!(!bus.is_optimizable_ram_address(0x9000_0000)); // EXRAM, GameCube
    assert!(!bus.is_optimizable_ram_address(0x4000_0000));
}
