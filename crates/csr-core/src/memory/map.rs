//! Fixed code address-space layout and decoding helpers.

use crate::encoding::INSN_BYTES;
use crate::REGISTER_ID_COUNT;

/// Length in bytes of one read fragment (two instructions).
pub const READ_SLOT_BYTES: usize = 2 * INSN_BYTES;
/// Length in bytes of one poke fragment (four instructions).
pub const POKE_SLOT_BYTES: usize = 4 * INSN_BYTES;

/// Base address of the precomputed read table.
pub const READ_TABLE_BASE: u64 = 0x0010_0000;
/// Size in bytes of the precomputed read table.
pub const READ_TABLE_BYTES: usize = REGISTER_ID_COUNT * READ_SLOT_BYTES;
/// Base address of the precomputed poke table.
pub const POKE_TABLE_BASE: u64 = 0x0014_0000;
/// Size in bytes of the precomputed poke table.
pub const POKE_TABLE_BYTES: usize = REGISTER_ID_COUNT * POKE_SLOT_BYTES;
/// Base address of the reusable patch buffer.
pub const PATCH_BUFFER_BASE: u64 = 0x0020_0000;
/// Size in bytes of the patch buffer (one page).
pub const PATCH_BUFFER_BYTES: usize = 0x1000;
/// Entry of the read fragment inside the patch buffer.
pub const PATCH_READ_ENTRY: u64 = PATCH_BUFFER_BASE;
/// Entry of the poke fragment inside the patch buffer.
pub const PATCH_POKE_ENTRY: u64 = PATCH_BUFFER_BASE + 0x10;

/// Return address loaded into `$ra`; reaching it ends a fragment.
pub const RETURN_ADDRESS: u64 = 0xFFFF_FFFF_FFFF_F000;

/// Region classification for code addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeRegion {
    /// Read fragment table.
    ReadTable,
    /// Poke fragment table.
    PokeTable,
    /// Reusable patch buffer.
    PatchBuffer,
}

/// Canonical descriptor of a code region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionDescriptor {
    /// Region classification.
    pub region: CodeRegion,
    /// Inclusive start address.
    pub base: u64,
    /// Length in bytes.
    pub len: usize,
}

impl RegionDescriptor {
    /// Exclusive end address.
    #[must_use]
    pub const fn end(self) -> u64 {
        self.base + self.len as u64
    }

    /// Returns `true` when `addr` lies inside the region.
    #[must_use]
    pub const fn contains(self, addr: u64) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// Byte offset of `addr` inside the region, if contained.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn offset_of(self, addr: u64) -> Option<usize> {
        if self.contains(addr) {
            Some((addr - self.base) as usize)
        } else {
            None
        }
    }
}

impl CodeRegion {
    /// Returns the fixed descriptor for this region.
    #[must_use]
    pub const fn descriptor(self) -> RegionDescriptor {
        let (base, len) = match self {
            Self::ReadTable => (READ_TABLE_BASE, READ_TABLE_BYTES),
            Self::PokeTable => (POKE_TABLE_BASE, POKE_TABLE_BYTES),
            Self::PatchBuffer => (PATCH_BUFFER_BASE, PATCH_BUFFER_BYTES),
        };
        RegionDescriptor {
            region: self,
            base,
            len,
        }
    }
}

/// All code regions in ascending address order.
pub const CODE_REGIONS: [CodeRegion; 3] = [
    CodeRegion::ReadTable,
    CodeRegion::PokeTable,
    CodeRegion::PatchBuffer,
];

/// Decodes the region an address belongs to.
#[must_use]
pub fn decode_code_region(addr: u64) -> Option<CodeRegion> {
    CODE_REGIONS
        .iter()
        .copied()
        .find(|region| region.descriptor().contains(addr))
}
