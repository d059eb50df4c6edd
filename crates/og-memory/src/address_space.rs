//! The guest address space
//!
//! Backing storage is a set of owned buffers, one per region from the
//! static region table. A physical address resolves to a (region, offset)
//! pair with one dispatch; there is no pointer arithmetic and no host
//! page-table trickery.

use og_core::config::ConsoleVariant;
use og_core::error::{MemoryError, MemoryResult};

use crate::constants::*;
use crate::region::{RegionFlags, RegionKind, REGION_TABLE};
use crate::value::MemValue;

/// A BAT-backed logical-to-physical window, kept in sync by the MMU so
/// the logical view of memory can be consulted without a full
/// translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalRegion {
    /// Guest logical base address
    pub logical_base: u32,
    /// Window size in bytes
    pub size: u32,
    /// Physical base the window maps to
    pub physical_base: u32,
}

/// One section of the raw snapshot surface
#[derive(Debug)]
pub struct SnapshotSection<'a> {
    /// Named marker for forward/backward compatibility checks
    pub marker: &'static str,
    /// Raw region contents
    pub data: &'a [u8],
}

/// The emulated console's memory regions
pub struct AddressSpace {
    ram: Box<[u8]>,
    l1_cache: Box<[u8]>,
    exram: Option<Box<[u8]>>,
    fake_vmem: Option<Box<[u8]>>,
    /// One slot per BAT register pair
    logical: [Option<LogicalRegion>; 8],
}

impl AddressSpace {
    /// Allocate every region present for the given console variant
    pub fn new(variant: ConsoleVariant, fake_vmem: bool) -> Self {
        let mut ram = Vec::new().into_boxed_slice();
        let mut l1_cache = Vec::new().into_boxed_slice();
        let mut exram = None;
        let mut fake = None;

        for desc in REGION_TABLE {
            if desc.flags.contains(RegionFlags::WII_ONLY) && variant != ConsoleVariant::Wii {
                continue;
            }
            if desc.flags.contains(RegionFlags::FAKE_VMEM_ONLY) && !fake_vmem {
                continue;
            }
            let backing = vec![0u8; desc.size as usize].into_boxed_slice();
            match desc.kind {
                RegionKind::Ram => ram = backing,
                RegionKind::L1Cache => l1_cache = backing,
                RegionKind::Exram => exram = Some(backing),
                RegionKind::FakeVmem => fake = Some(backing),
            }
        }

        tracing::info!(
            "Memory system initialized: {:?}, fake_vmem={}",
            variant,
            fake_vmem
        );

        Self {
            ram,
            l1_cache,
            exram,
            fake_vmem: fake,
            logical: [None; 8],
        }
    }

    /// Whether this address space has Wii expansion RAM
    pub fn has_exram(&self) -> bool {
        self.exram.is_some()
    }

    /// Whether fake-VMEM backing is present
    pub fn has_fake_vmem(&self) -> bool {
        self.fake_vmem.is_some()
    }

    /// Zero every region
    pub fn clear(&mut self) {
        self.ram.fill(0);
        self.l1_cache.fill(0);
        if let Some(exram) = &mut self.exram {
            exram.fill(0);
        }
        if let Some(fake) = &mut self.fake_vmem {
            fake.fill(0);
        }
    }

    /// Resolve a physical address to a region and byte offset.
    ///
    /// Returns `None` for addresses outside every backed region; the
    /// caller decides whether that is a soft failure or a reportable one.
    #[inline]
    pub fn resolve(&self, address: u32) -> Option<(RegionKind, usize)> {
        let segment = address >> 28;
        if address < REALRAM_SIZE {
            return Some((RegionKind::Ram, address as usize));
        }
        if self.exram.is_some() && segment == 0x1 && (address & 0x0FFF_FFFF) < EXRAM_SIZE {
            return Some((RegionKind::Exram, (address & 0x0FFF_FFFF) as usize));
        }
        if segment == 0xE && address < L1_CACHE_BASE + L1_CACHE_SIZE {
            return Some((RegionKind::L1Cache, (address & 0x0FFF_FFFF) as usize));
        }
        if self.fake_vmem.is_some() && (address >> 24) & 0xFE == 0x7E {
            return Some((RegionKind::FakeVmem, (address & RAM_MASK) as usize));
        }
        None
    }

    /// Borrow a region's contents
    pub fn region(&self, kind: RegionKind) -> Option<&[u8]> {
        match kind {
            RegionKind::Ram => Some(&self.ram),
            RegionKind::L1Cache => Some(&self.l1_cache),
            RegionKind::Exram => self.exram.as_deref(),
            RegionKind::FakeVmem => self.fake_vmem.as_deref(),
        }
    }

    /// Borrow a region's contents mutably
    pub fn region_mut(&mut self, kind: RegionKind) -> Option<&mut [u8]> {
        match kind {
            RegionKind::Ram => Some(&mut self.ram),
            RegionKind::L1Cache => Some(&mut self.l1_cache),
            RegionKind::Exram => self.exram.as_deref_mut(),
            RegionKind::FakeVmem => self.fake_vmem.as_deref_mut(),
        }
    }

    /// The locked cache contents (always present)
    pub fn l1_cache(&self) -> &[u8] {
        &self.l1_cache
    }

    /// The locked cache contents, mutably
    pub fn l1_cache_mut(&mut self) -> &mut [u8] {
        &mut self.l1_cache
    }

    /// Typed big-endian read at a physical address
    #[inline]
    pub fn read_phys<T: MemValue>(&self, address: u32) -> Option<T> {
        let (kind, offset) = self.resolve(address)?;
        let region = self.region(kind)?;
        if offset + T::SIZE > region.len() {
            return None;
        }
        Some(T::read_be(&region[offset..]))
    }

    /// Typed big-endian write at a physical address; returns false when
    /// the address resolves to no region.
    #[inline]
    pub fn write_phys<T: MemValue>(&mut self, address: u32, value: T) -> bool {
        let Some((kind, offset)) = self.resolve(address) else {
            return false;
        };
        let Some(region) = self.region_mut(kind) else {
            return false;
        };
        if offset + T::SIZE > region.len() {
            return false;
        }
        value.write_be(&mut region[offset..]);
        true
    }

    // ------------------------------------------------------------------
    // Logical (BAT-backed) view

    /// Replace the logical window for one BAT slot
    pub fn replace_logical_region(&mut self, slot: usize, region: Option<LogicalRegion>) {
        self.logical[slot] = region.filter(|r| r.size != 0);
    }

    /// Look a logical address up in the BAT-backed windows
    pub fn logical_lookup(&self, address: u32) -> Option<u32> {
        for region in self.logical.iter().flatten() {
            if address.wrapping_sub(region.logical_base) < region.size {
                return Some(region.physical_base + (address - region.logical_base));
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Device (physically addressed) accessors, for emulated hardware
    // outside the CPU. No translation, no exceptions.

    fn device_resolve(&self, address: u32) -> MemoryResult<(RegionKind, usize)> {
        let address = address & 0x3FFF_FFFF;
        if address < REALRAM_SIZE {
            return Ok((RegionKind::Ram, address as usize));
        }
        if self.exram.is_some() && (address >> 28) == 0x1 && (address & 0x0FFF_FFFF) < EXRAM_SIZE {
            return Ok((RegionKind::Exram, (address & EXRAM_MASK) as usize));
        }
        tracing::error!("Unknown device pointer 0x{:08x}", address);
        Err(MemoryError::Unmapped { address })
    }

    fn device_valid_range(&self, address: u32, size: u32) -> MemoryResult<(RegionKind, usize)> {
        // A range must stay within one bank.
        let (kind, offset) = self.device_resolve(address)?;
        if size >= EXRAM_SIZE {
            return Err(MemoryError::InvalidRange { address, size });
        }
        let (end_kind, _) = self.device_resolve(address.wrapping_add(size))?;
        if end_kind != kind {
            return Err(MemoryError::InvalidRange { address, size });
        }
        Ok((kind, offset))
    }

    /// Borrow a device-addressable byte range
    pub fn device_slice(&self, address: u32, size: u32) -> MemoryResult<&[u8]> {
        let (kind, offset) = self.device_valid_range(address, size)?;
        let region = self.region(kind).ok_or(MemoryError::Unmapped { address })?;
        Ok(&region[offset..offset + size as usize])
    }

    /// Borrow a device-addressable byte range mutably
    pub fn device_slice_mut(&mut self, address: u32, size: u32) -> MemoryResult<&mut [u8]> {
        let (kind, offset) = self.device_valid_range(address, size)?;
        let region = self
            .region_mut(kind)
            .ok_or(MemoryError::Unmapped { address })?;
        Ok(&mut region[offset..offset + size as usize])
    }

    /// Typed device read
    pub fn device_read<T: MemValue>(&self, address: u32) -> MemoryResult<T> {
        let slice = self.device_slice(address, T::SIZE as u32)?;
        Ok(T::read_be(slice))
    }

    /// Typed device write
    pub fn device_write<T: MemValue>(&mut self, address: u32, value: T) -> MemoryResult<()> {
        let slice = self.device_slice_mut(address, T::SIZE as u32)?;
        value.write_be(slice);
        Ok(())
    }

    /// Copy guest memory out into a host buffer
    pub fn device_copy_from_emu(&self, data: &mut [u8], address: u32) -> MemoryResult<()> {
        let src = self.device_slice(address, data.len() as u32)?;
        data.copy_from_slice(src);
        Ok(())
    }

    /// Copy a host buffer into guest memory
    pub fn device_copy_to_emu(&mut self, address: u32, data: &[u8]) -> MemoryResult<()> {
        let dst = self.device_slice_mut(address, data.len() as u32)?;
        dst.copy_from_slice(data);
        Ok(())
    }

    /// Fill a guest range with a byte value
    pub fn device_fill(&mut self, address: u32, value: u8, length: u32) -> MemoryResult<()> {
        let dst = self.device_slice_mut(address, length)?;
        dst.fill(value);
        Ok(())
    }

    /// Read a NUL-terminated (or fixed-size) string from guest memory
    pub fn device_get_string(&self, address: u32, size: usize) -> String {
        let mut out = Vec::new();
        let mut addr = address;
        loop {
            let Ok(byte) = self.device_read::<u8>(addr) else {
                break;
            };
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

    // ------------------------------------------------------------------
    // Snapshot surface

    /// Raw region dumps in the fixed snapshot order. The JIT code cache
    /// is never part of this surface; it repopulates on demand after a
    /// state load.
    pub fn snapshot_sections(&self) -> Vec<SnapshotSection<'_>> {
        let mut sections = vec![
            SnapshotSection {
                marker: "Memory RAM",
                data: &self.ram,
            },
            SnapshotSection {
                marker: "Memory L1",
                data: &self.l1_cache,
            },
        ];
        if let Some(exram) = &self.exram {
            sections.push(SnapshotSection {
                marker: "Memory EXRAM",
                data: exram,
            });
        }
        if let Some(fake) = &self.fake_vmem {
            sections.push(SnapshotSection {
                marker: "Memory FakeVMEM",
                data: fake,
            });
        }
        sections
    }
}
