//! Hardware register word formats
//!
//! Each wrapper exposes the bit fields of one architectural word through
//! shift/mask accessors. The bit positions are load-bearing: page table
//! entries are read from and written back to emulated physical memory in
//! exactly this layout.

use bitflags::bitflags;

/// Machine State Register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Msr(pub u32);

impl Msr {
    /// DR: data address translation enabled (bit 4)
    #[inline]
    pub fn data_translation(self) -> bool {
        self.0 & (1 << 4) != 0
    }

    /// IR: instruction address translation enabled (bit 5)
    #[inline]
    pub fn instruction_translation(self) -> bool {
        self.0 & (1 << 5) != 0
    }
}

/// Segment register: VSID in the low 24 bits
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentRegister(pub u32);

impl SegmentRegister {
    /// 24-bit virtual segment ID
    #[inline]
    pub fn vsid(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }
}

/// SDR1: page table base and size
#[derive(Debug, Clone, Copy, Default)]
pub struct Sdr1(pub u32);

impl Sdr1 {
    /// HTABORG: high 16 bits of the table's physical base
    #[inline]
    pub fn htaborg(self) -> u32 {
        (self.0 >> 16) & 0xFFFF
    }

    /// HTABMASK: 9-bit mask extending the hash
    #[inline]
    pub fn htabmask(self) -> u32 {
        self.0 & 0x1FF
    }
}

/// Upper word of a BAT register pair
#[derive(Debug, Clone, Copy, Default)]
pub struct BatUpper(pub u32);

impl BatUpper {
    /// BEPI: effective block base, in 128 KB units
    #[inline]
    pub fn bepi(self) -> u32 {
        self.0 >> 17
    }

    /// BL: block length mask; size is (BL + 1) 128 KB granules
    #[inline]
    pub fn bl(self) -> u32 {
        (self.0 >> 2) & 0x7FF
    }
}

/// Lower word of a BAT register pair
#[derive(Debug, Clone, Copy, Default)]
pub struct BatLower(pub u32);

impl BatLower {
    /// BRPN: physical block base, in 128 KB units
    #[inline]
    pub fn brpn(self) -> u32 {
        self.0 >> 17
    }

    /// PP: protection; zero means no access
    #[inline]
    pub fn pp(self) -> u32 {
        self.0 & 3
    }
}

/// First word of a page table entry (the tag word)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pte1(pub u32);

impl Pte1 {
    /// Valid bit (bit 31)
    pub const VALID: u32 = 1 << 31;
    /// Hash function select bit (bit 6)
    pub const HASH: u32 = 1 << 6;

    /// Compose a tag word from VSID and abbreviated page index
    #[inline]
    pub fn compose(vsid: u32, api: u32) -> Self {
        Self((vsid << 7) | api | Self::VALID)
    }

    /// 24-bit VSID field
    #[inline]
    pub fn vsid(self) -> u32 {
        (self.0 >> 7) & 0x00FF_FFFF
    }

    /// 6-bit abbreviated page index
    #[inline]
    pub fn api(self) -> u32 {
        self.0 & 0x3F
    }

    /// Select the secondary hash function
    #[inline]
    pub fn with_secondary_hash(self) -> Self {
        Self(self.0 | Self::HASH)
    }
}

/// Second word of a page table entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pte2(pub u32);

impl Pte2 {
    /// 20-bit real page number
    #[inline]
    pub fn rpn(self) -> u32 {
        self.0 >> 12
    }

    /// Referenced bit (bit 8)
    #[inline]
    pub fn referenced(self) -> bool {
        self.0 & (1 << 8) != 0
    }

    /// Changed bit (bit 7)
    #[inline]
    pub fn changed(self) -> bool {
        self.0 & (1 << 7) != 0
    }

    /// Set the referenced bit
    #[inline]
    pub fn set_referenced(&mut self) {
        self.0 |= 1 << 8;
    }

    /// Set the changed bit
    #[inline]
    pub fn set_changed(&mut self) {
        self.0 |= 1 << 7;
    }

    /// WIMG storage attribute bits
    #[inline]
    pub fn wimg(self) -> u32 {
        (self.0 >> 3) & 0xF
    }

    /// PP protection bits
    #[inline]
    pub fn pp(self) -> u32 {
        self.0 & 3
    }
}

bitflags! {
    /// Pending guest exception latches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Exceptions: u32 {
        /// External interrupt pending
        const EXTERNAL_INT = 1 << 2;
        /// Data storage interrupt
        const DSI = 1 << 3;
        /// Instruction storage interrupt
        const ISI = 1 << 4;
    }
}

/// DSISR: page fault cause
pub const DSISR_PAGE_FAULT: u32 = 1 << 30;
/// DSISR: protection violation cause
pub const DSISR_PROTECTION: u32 = 1 << 27;
/// DSISR: the faulting access was a store
pub const DSISR_STORE: u32 = 1 << 25;

/// One BAT register pair
#[derive(Debug, Clone, Copy, Default)]
pub struct BatPair {
    /// Upper (effective-side) word
    pub upper: u32,
    /// Lower (physical-side) word
    pub lower: u32,
}

/// The architectural state the translation pipeline reads and writes.
///
/// Owned by the MMU context object; there are no process-wide statics, so
/// independent instances can coexist in tests.
#[derive(Debug, Clone)]
pub struct GekkoRegisters {
    /// Machine state register
    pub msr: Msr,
    /// Segment registers, indexed by the top 4 address bits
    pub sr: [u32; 16],
    /// Current instruction address
    pub pc: u32,
    /// Next instruction address (exception redirect target)
    pub npc: u32,
    /// Data address register (faulting address)
    pub dar: u32,
    /// DSI status register (fault cause)
    pub dsisr: u32,
    /// Pending exception latches
    pub exceptions: Exceptions,
    /// Data BAT register pairs (4, or 8 in extended mode)
    pub dbat: [BatPair; 8],
    /// Instruction BAT register pairs
    pub ibat: [BatPair; 8],
    /// Wii HID4.SBE: the second set of four BAT pairs is active
    pub extended_bats: bool,
    /// Decoded page table physical base (from SDR1)
    pub pagetable_base: u32,
    /// Decoded page table hash mask (from SDR1)
    pub pagetable_hashmask: u32,
}

impl Default for GekkoRegisters {
    fn default() -> Self {
        Self {
            msr: Msr(0),
            sr: [0; 16],
            pc: 0,
            npc: 0,
            dar: 0,
            dsisr: 0,
            exceptions: Exceptions::empty(),
            dbat: [BatPair::default(); 8],
            ibat: [BatPair::default(); 8],
            extended_bats: false,
            pagetable_base: 0,
            pagetable_hashmask: 0,
        }
    }
}

impl GekkoRegisters {
    /// Segment register for an effective address
    #[inline]
    pub fn segment_for(&self, address: u32) -> SegmentRegister {
        SegmentRegister(self.sr[(address >> 28) as usize])
    }
}
