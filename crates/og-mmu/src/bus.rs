//! Hardware access routing
//!
//! The unified read/write entry point used by the interpreter and by the
//! slow paths called from generated code. Resolves translation when the
//! MSR enables it, then dispatches the physical address to RAM, expansion
//! RAM, the locked cache, the framebuffer window, MMIO, or the gather
//! pipe. Failures never unwind: a guest-visible fault latches an
//! exception, an unresolvable address soft-fails with a zero read or a
//! dropped write.

use std::sync::Arc;

use og_core::config::Config;
use og_memory::constants::*;
use og_memory::memcheck::WatchHit;
use og_memory::{
    AddressSpace, EfbCoord, FramebufferAccess, GatherPipe, MemChecks, MemValue, MmioDevice,
    MmioMap,
};

use crate::registers::{Exceptions, DSISR_PAGE_FAULT, DSISR_STORE};
use crate::translate::{AccessKind, Mmu};

/// Result of an instruction fetch attempt.
///
/// Unlike data accesses, a failed fetch does not latch the exception
/// here: the interpreter's prefetch path wants to decide that itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryReadInstResult {
    /// The fetch translated and completed
    pub valid: bool,
    /// Translation came from the instruction BAT path
    pub from_bat: bool,
    /// The fetched instruction word
    pub hex: u32,
}

/// Receives a notification for every completed guest write, so the JIT
/// block cache can invalidate code the write may have touched.
pub trait CodeWatcher: Send + Sync {
    /// A write of `size` bytes completed at `address`
    fn notify_write(&self, address: u32, size: u32);
}

/// The hardware access router
pub struct Bus {
    /// Backing memory regions
    pub space: AddressSpace,
    /// Translation context
    pub mmu: Mmu,
    /// CPU-side graphics FIFO staging
    pub gather_pipe: GatherPipe,
    /// Watchpoint registry
    pub memchecks: MemChecks,
    framebuffer: Box<dyn FramebufferAccess>,
    mmio: MmioMap,
    code_watcher: Option<Arc<dyn CodeWatcher>>,
    memcheck_enabled: bool,
    watch_hit: Option<WatchHit>,
}

impl Bus {
    /// Build the router and its regions from the configuration
    pub fn new(config: &Config, framebuffer: Box<dyn FramebufferAccess>) -> Self {
        let fake_vmem = config.system.mmu == og_core::config::MmuMode::FakeVmem;
        Self {
            space: AddressSpace::new(config.system.console, fake_vmem),
            mmu: Mmu::new(config.system.mmu),
            gather_pipe: GatherPipe::new(),
            memchecks: MemChecks::new(),
            framebuffer,
            mmio: MmioMap::new(),
            code_watcher: None,
            memcheck_enabled: config.debug.enable_memcheck,
            watch_hit: None,
        }
    }

    /// Install the write-invalidation hook for the JIT block cache
    pub fn set_code_watcher(&mut self, watcher: Arc<dyn CodeWatcher>) {
        self.code_watcher = Some(watcher);
    }

    /// Register a device register window
    pub fn register_mmio(&mut self, base: u32, size: u32, device: Box<dyn MmioDevice>) {
        self.mmio.register(base, size, device);
    }

    /// Take and clear a pending watchpoint break request
    pub fn take_watch_hit(&mut self) -> Option<WatchHit> {
        self.watch_hit.take()
    }

    // ------------------------------------------------------------------
    // Generic access core

    fn read_hardware<T: MemValue>(&mut self, address: u32, kind: AccessKind) -> T {
        let mut address = address;
        if kind != AccessKind::NoTranslate && self.mmu.regs.msr.data_translation() {
            let Some(t) = self.mmu.translate(&mut self.space, address, kind) else {
                if kind == AccessKind::Read {
                    self.generate_dsi_exception(address, false);
                }
                return T::from_u64(0);
            };
            if (address & PAGE_MASK) as usize > PAGE_SIZE as usize - T::SIZE {
                // The access straddles a page boundary: translate the
                // second page and assemble byte by byte.
                let next_page = address.wrapping_add(T::SIZE as u32 - 1) & !PAGE_MASK;
                let Some(t2) = self.mmu.translate(&mut self.space, next_page, kind) else {
                    if kind == AccessKind::Read {
                        self.generate_dsi_exception(next_page, false);
                    }
                    return T::from_u64(0);
                };
                let mut var = 0u64;
                let mut phys = t.address;
                for i in 0..T::SIZE as u32 {
                    if address.wrapping_add(i) == next_page {
                        phys = t2.address;
                    }
                    var = (var << 8) | self.read_physical::<u8>(phys, kind).to_u64();
                    phys = phys.wrapping_add(1);
                }
                return T::from_u64(var);
            }
            address = t.address;
        }
        self.read_physical::<T>(address, kind)
    }

    fn read_physical<T: MemValue>(&mut self, address: u32, kind: AccessKind) -> T {
        if kind == AccessKind::Read && (address & HW_WINDOW_MASK) == HW_WINDOW_BASE {
            if address < EFB_WINDOW_END {
                let coord = EfbCoord::decode(address);
                let var = if coord.depth {
                    self.framebuffer.peek_depth(coord.x, coord.y)
                } else {
                    self.framebuffer.peek_color(coord.x, coord.y)
                };
                return T::from_u64(var as u64);
            }
            let var = self.mmio.read(address | MMIO_REGISTER_BASE, T::SIZE as u32);
            return T::from_u64(var);
        }

        if let Some(var) = self.space.read_phys::<T>(address) {
            return var;
        }

        if matches!(kind, AccessKind::Read | AccessKind::NoTranslate) {
            tracing::error!(
                "Unable to resolve read address 0x{:08x} PC 0x{:08x}",
                address,
                self.mmu.regs.pc
            );
        }
        T::from_u64(0)
    }

    fn write_hardware<T: MemValue>(&mut self, address: u32, value: T, kind: AccessKind) {
        let mut physical = address;
        if kind != AccessKind::NoTranslate && self.mmu.regs.msr.data_translation() {
            let Some(t) = self.mmu.translate(&mut self.space, address, kind) else {
                if kind == AccessKind::Write {
                    self.generate_dsi_exception(address, true);
                }
                return;
            };
            if address & (T::SIZE as u32 - 1) != 0
                && (address & PAGE_MASK) as usize > PAGE_SIZE as usize - T::SIZE
            {
                let next_page = address.wrapping_add(T::SIZE as u32 - 1) & !PAGE_MASK;
                let Some(t2) = self.mmu.translate(&mut self.space, next_page, kind) else {
                    if kind == AccessKind::Write {
                        self.generate_dsi_exception(next_page, true);
                    }
                    return;
                };
                let val = value.to_u64();
                let mut phys = t.address;
                for i in 0..T::SIZE {
                    let addr = address.wrapping_add(i as u32);
                    if addr == next_page {
                        phys = t2.address;
                    }
                    let byte = (val >> (8 * (T::SIZE - 1 - i))) as u8;
                    self.write_physical::<u8>(addr, phys, byte, kind);
                    phys = phys.wrapping_add(1);
                }
                return;
            }
            physical = t.address;
        }
        self.write_physical::<T>(address, physical, value, kind);
    }

    fn write_physical<T: MemValue>(
        &mut self,
        effective: u32,
        address: u32,
        value: T,
        kind: AccessKind,
    ) {
        if kind == AccessKind::Write && (address & GATHER_PIPE_MASK) == GATHER_PIPE_BASE {
            self.gather_pipe.write(&mut self.space, value);
            return;
        }
        if kind == AccessKind::Write && (address & HW_WINDOW_MASK) == HW_WINDOW_BASE {
            if address < EFB_WINDOW_END {
                let coord = EfbCoord::decode(address);
                let var = value.to_u64() as u32;
                if coord.depth {
                    self.framebuffer.poke_depth(coord.x, coord.y, var);
                } else {
                    self.framebuffer.poke_color(coord.x, coord.y, var);
                }
                return;
            }
            self.mmio
                .write(address | MMIO_REGISTER_BASE, T::SIZE as u32, value.to_u64());
            return;
        }

        if self.space.write_phys::<T>(address, value) {
            // Self-modifying code: the block cache must see the write
            // before the touched range can execute again.
            if let Some(watcher) = &self.code_watcher {
                watcher.notify_write(effective, T::SIZE as u32);
            }
            return;
        }

        if matches!(kind, AccessKind::Write | AccessKind::NoTranslate) {
            tracing::error!(
                "Unable to resolve write address 0x{:08x} PC 0x{:08x}",
                address,
                self.mmu.regs.pc
            );
        }
    }

    fn memcheck(&mut self, address: u32, value: u64, write: bool, size: u32) {
        if !self.memcheck_enabled || self.memchecks.is_empty() {
            return;
        }
        let pc = self.mmu.regs.pc;
        if let Some(hit) = self.memchecks.action(address, value, write, size, pc) {
            if hit.should_break {
                self.watch_hit = Some(hit);
            }
        }
    }

    // ------------------------------------------------------------------
    // Exception-raising CPU accessors

    /// Read a byte
    pub fn read_u8(&mut self, address: u32) -> u8 {
        let var = self.read_hardware::<u8>(address, AccessKind::Read);
        self.memcheck(address, var as u64, false, 1);
        var
    }

    /// Read a halfword
    pub fn read_u16(&mut self, address: u32) -> u16 {
        let var = self.read_hardware::<u16>(address, AccessKind::Read);
        self.memcheck(address, var as u64, false, 2);
        var
    }

    /// Read a word
    pub fn read_u32(&mut self, address: u32) -> u32 {
        let var = self.read_hardware::<u32>(address, AccessKind::Read);
        self.memcheck(address, var as u64, false, 4);
        var
    }

    /// Read a doubleword
    pub fn read_u64(&mut self, address: u32) -> u64 {
        let var = self.read_hardware::<u64>(address, AccessKind::Read);
        self.memcheck(address, var, false, 8);
        var
    }

    /// Read a single-precision float
    pub fn read_f32(&mut self, address: u32) -> f32 {
        f32::from_bits(self.read_u32(address))
    }

    /// Read a double-precision float
    pub fn read_f64(&mut self, address: u32) -> f64 {
        f64::from_bits(self.read_u64(address))
    }

    /// Write a byte
    pub fn write_u8(&mut self, address: u32, value: u8) {
        self.memcheck(address, value as u64, true, 1);
        self.write_hardware::<u8>(address, value, AccessKind::Write);
    }

    /// Write a halfword
    pub fn write_u16(&mut self, address: u32, value: u16) {
        self.memcheck(address, value as u64, true, 2);
        self.write_hardware::<u16>(address, value, AccessKind::Write);
    }

    /// Write a word
    pub fn write_u32(&mut self, address: u32, value: u32) {
        self.memcheck(address, value as u64, true, 4);
        self.write_hardware::<u32>(address, value, AccessKind::Write);
    }

    /// Write a doubleword
    pub fn write_u64(&mut self, address: u32, value: u64) {
        self.memcheck(address, value, true, 8);
        self.write_hardware::<u64>(address, value, AccessKind::Write);
    }

    /// Write a byte-reversed halfword (generated code's `sthbrx`)
    pub fn write_u16_swap(&mut self, address: u32, value: u16) {
        self.write_u16(address, value.swap_bytes());
    }

    /// Write a byte-reversed word
    pub fn write_u32_swap(&mut self, address: u32, value: u32) {
        self.write_u32(address, value.swap_bytes());
    }

    /// Write a byte-reversed doubleword
    pub fn write_u64_swap(&mut self, address: u32, value: u64) {
        self.write_u64(address, value.swap_bytes());
    }

    /// Write a double-precision float
    pub fn write_f64(&mut self, address: u32, value: f64) {
        self.write_u64(address, value.to_bits());
    }

    /// Zero an aligned guest cache line through the write path
    pub fn clear_cache_line(&mut self, address: u32) {
        for i in (0..CACHE_LINE_SIZE).step_by(8) {
            self.write_u64(address + i, 0);
        }
    }

    // ------------------------------------------------------------------
    // Instruction fetch

    /// Attempt an instruction fetch without latching an exception
    pub fn try_read_instruction(&mut self, address: u32) -> TryReadInstResult {
        let mut address = address;
        let mut from_bat = true;
        if self.mmu.regs.msr.instruction_translation() {
            match self.mmu.translate(&mut self.space, address, AccessKind::Opcode) {
                None => {
                    return TryReadInstResult {
                        valid: false,
                        from_bat: false,
                        hex: 0,
                    }
                }
                Some(t) => {
                    address = t.address;
                    from_bat = t.from_bat;
                }
            }
            if address & 0xC000_0000 != 0 {
                tracing::error!("Strange translated program counter: 0x{:08x}", address);
            }
        }
        let hex = self.space.read_phys::<u32>(address).unwrap_or(0);
        TryReadInstResult {
            valid: true,
            from_bat,
            hex,
        }
    }

    /// Fetch an instruction, latching an ISI on failure
    pub fn read_opcode(&mut self, address: u32) -> u32 {
        let result = self.try_read_instruction(address);
        if !result.valid {
            self.generate_isi_exception(address);
            return 0;
        }
        result.hex
    }

    // ------------------------------------------------------------------
    // Host (debugger) accessors: silent probes, no exceptions

    /// Probe-read a byte
    pub fn host_read_u8(&mut self, address: u32) -> u8 {
        self.read_hardware::<u8>(address, AccessKind::Probe)
    }

    /// Probe-read a halfword
    pub fn host_read_u16(&mut self, address: u32) -> u16 {
        self.read_hardware::<u16>(address, AccessKind::Probe)
    }

    /// Probe-read a word
    pub fn host_read_u32(&mut self, address: u32) -> u32 {
        self.read_hardware::<u32>(address, AccessKind::Probe)
    }

    /// Probe-write a byte
    pub fn host_write_u8(&mut self, address: u32, value: u8) {
        self.write_hardware::<u8>(address, value, AccessKind::Probe);
    }

    /// Probe-write a halfword
    pub fn host_write_u16(&mut self, address: u32, value: u16) {
        self.write_hardware::<u16>(address, value, AccessKind::Probe);
    }

    /// Probe-write a word
    pub fn host_write_u32(&mut self, address: u32, value: u32) {
        self.write_hardware::<u32>(address, value, AccessKind::Probe);
    }

    /// Read a NUL-terminated string through the CPU's view of memory
    pub fn host_get_string(&mut self, address: u32, size: usize) -> String {
        let mut out = Vec::new();
        let mut addr = address;
        loop {
            if !self.host_is_ram_address(addr) {
                break;
            }
            let byte = self.host_read_u8(addr);
            if byte == 0 {
                break;
            }
            out.push(byte);
            addr = addr.wrapping_add(1);
            if size != 0 && out.len() >= size {
                break;
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Whether an address resolves to RAM under the current CPU state
    pub fn host_is_ram_address(&mut self, address: u32) -> bool {
        let mut address = address;
        if self.mmu.regs.msr.data_translation() {
            match self.mmu.translate(&mut self.space, address, AccessKind::Probe) {
                None => return false,
                Some(t) => address = t.address,
            }
        }
        let segment = address >> 28;
        if segment == 0x0 && (address & 0x0FFF_FFFF) < REALRAM_SIZE {
            return true;
        }
        self.space.has_exram() && segment == 0x1 && (address & 0x0FFF_FFFF) < EXRAM_SIZE
    }

    /// Whether a read or write to this address may be compiled as an
    /// unguarded direct memory access. BAT/MSR-dependent; ignores page
    /// tables.
    pub fn is_optimizable_ram_address(&self, address: u32) -> bool {
        if !self.mmu.regs.msr.data_translation() {
            return false;
        }
        let segment = address >> 28;
        let offset = address & 0x0FFF_FFFF;
        ((segment == 0x8 || segment == 0xC || segment == 0x0) && offset < REALRAM_SIZE)
            || (self.space.has_exram() && (segment == 0x9 || segment == 0xD) && offset < EXRAM_SIZE)
            || (segment == 0xE && address < L1_CACHE_BASE + L1_CACHE_SIZE)
    }

    // ------------------------------------------------------------------
    // Locked cache DMA

    /// DMA a run of cache lines from the locked cache into memory
    pub fn dma_lc_to_memory(&mut self, mem_addr: u32, cache_addr: u32, num_blocks: u32) {
        let len = CACHE_LINE_SIZE * num_blocks;

        // The EFB and register windows must go through their interfaces,
        // word by word.
        if (mem_addr & 0x0F00_0000) == 0x0800_0000 || (mem_addr & 0x0F00_0000) == 0x0C00_0000 {
            for i in (0..len).step_by(4) {
                let offset = ((cache_addr + i) & L1_CACHE_MASK) as usize;
                let data = u32::read_be(&self.space.l1_cache()[offset..]);
                self.write_physical::<u32>(mem_addr + i, mem_addr + i, data, AccessKind::Write);
            }
            return;
        }

        let mut line = vec![0u8; len as usize];
        {
            let l1 = self.space.l1_cache();
            for (i, byte) in line.iter_mut().enumerate() {
                *byte = l1[((cache_addr as usize) + i) & L1_CACHE_MASK as usize];
            }
        }
        if self.space.device_copy_to_emu(mem_addr, &line).is_err() {
            tracing::error!("LC DMA to unresolvable address 0x{:08x}", mem_addr);
        }
    }

    /// DMA a run of cache lines from memory into the locked cache
    pub fn dma_memory_to_lc(&mut self, cache_addr: u32, mem_addr: u32, num_blocks: u32) {
        let len = CACHE_LINE_SIZE * num_blocks;

        if (mem_addr & 0x0F00_0000) == 0x0800_0000 || (mem_addr & 0x0F00_0000) == 0x0C00_0000 {
            for i in (0..len).step_by(4) {
                let data = self.read_physical::<u32>(mem_addr + i, AccessKind::Read);
                let offset = ((cache_addr + i) & L1_CACHE_MASK) as usize;
                data.write_be(&mut self.space.l1_cache_mut()[offset..]);
            }
            return;
        }

        let mut line = vec![0u8; len as usize];
        if self.space.device_copy_from_emu(&mut line, mem_addr).is_err() {
            tracing::error!("LC DMA from unresolvable address 0x{:08x}", mem_addr);
            return;
        }
        let l1 = self.space.l1_cache_mut();
        for (i, byte) in line.iter().enumerate() {
            l1[((cache_addr as usize) + i) & L1_CACHE_MASK as usize] = *byte;
        }
    }

    // ------------------------------------------------------------------
    // Exceptions

    fn generate_dsi_exception(&mut self, address: u32, write: bool) {
        if !self.mmu.full_mmu() {
            tracing::error!(
                "Invalid {} 0x{:08x}, PC = 0x{:08x}",
                if write { "write to" } else { "read from" },
                address,
                self.mmu.regs.pc
            );
            return;
        }
        let mut dsisr = DSISR_PAGE_FAULT;
        if write {
            dsisr |= DSISR_STORE;
        }
        self.mmu.regs.dsisr = dsisr;
        self.mmu.regs.dar = address;
        self.mmu.regs.exceptions |= Exceptions::DSI;
    }

    fn generate_isi_exception(&mut self, address: u32) {
        // The faulting address becomes the resume point the guest
        // handler sees.
        self.mmu.regs.npc = address;
        self.mmu.regs.exceptions |= Exceptions::ISI;
    }
}
