//! Precomputed fragment table.
//!
//! Every id gets a read and a poke fragment at a fixed offset, so resolving
//! an id to code is pure arithmetic. The table is generated once and is
//! execute-only afterwards.

use crate::codegen::{poke_fragment, read_fragment};
use crate::encoding::write_words;
use crate::icache::{read_line, CodeSource, ICACHE_LINE_WORDS};
use crate::memory::{
    decode_code_region, new_region_backing, CodeRegion, PageProtector, Protection,
    POKE_SLOT_BYTES, POKE_TABLE_BASE, POKE_TABLE_BYTES, READ_SLOT_BYTES, READ_TABLE_BASE,
    READ_TABLE_BYTES,
};
use crate::{AccessKind, Fault, ProbeError, RegisterId};

/// Immutable read and poke fragment tables.
pub struct CodeTable {
    read: Box<[u8]>,
    poke: Box<[u8]>,
}

impl std::fmt::Debug for CodeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeTable")
            .field("read_bytes", &self.read.len())
            .field("poke_bytes", &self.poke.len())
            .finish()
    }
}

impl CodeTable {
    /// Generates both tables and seals them execute-only.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::OutOfMemory`] when backing storage cannot be
    /// allocated, or [`ProbeError::Protection`] when sealing fails.
    pub fn generate(protector: &dyn PageProtector) -> Result<Self, ProbeError> {
        let mut read = new_region_backing(READ_TABLE_BYTES)?;
        let mut poke = new_region_backing(POKE_TABLE_BYTES)?;

        for (id, slot) in RegisterId::all().zip(read.chunks_exact_mut(READ_SLOT_BYTES)) {
            write_words(slot, &read_fragment(id));
        }
        for (id, slot) in RegisterId::all().zip(poke.chunks_exact_mut(POKE_SLOT_BYTES)) {
            write_words(slot, &poke_fragment(id));
        }

        for region in [CodeRegion::ReadTable, CodeRegion::PokeTable] {
            let descriptor = region.descriptor();
            if !protector.set_protection(descriptor, Protection::ExecOnly) {
                return Err(ProbeError::Protection {
                    addr: descriptor.base,
                    to: Protection::ExecOnly,
                });
            }
        }

        Ok(Self { read, poke })
    }

    /// Entry point of the `kind` fragment for `id`.
    #[must_use]
    pub const fn entry(kind: AccessKind, id: RegisterId) -> u64 {
        match kind {
            AccessKind::Read => READ_TABLE_BASE + id.get() as u64 * READ_SLOT_BYTES as u64,
            AccessKind::Poke => POKE_TABLE_BASE + id.get() as u64 * POKE_SLOT_BYTES as u64,
        }
    }

    /// Raw bytes of the `kind` slot for `id`.
    #[must_use]
    pub fn slot(&self, kind: AccessKind, id: RegisterId) -> &[u8] {
        match kind {
            AccessKind::Read => {
                &self.read[id.index() * READ_SLOT_BYTES..(id.index() + 1) * READ_SLOT_BYTES]
            }
            AccessKind::Poke => {
                &self.poke[id.index() * POKE_SLOT_BYTES..(id.index() + 1) * POKE_SLOT_BYTES]
            }
        }
    }
}

impl CodeSource for CodeTable {
    fn check_fetch(&self, addr: u64) -> Result<(), Fault> {
        match decode_code_region(addr) {
            Some(CodeRegion::ReadTable | CodeRegion::PokeTable) => Ok(()),
            Some(CodeRegion::PatchBuffer) | None => Err(Fault::UnmappedFetch),
        }
    }

    fn load_line(&self, line_addr: u64) -> Result<[u32; ICACHE_LINE_WORDS], Fault> {
        let (bytes, region) = match decode_code_region(line_addr) {
            Some(CodeRegion::ReadTable) => (&self.read, CodeRegion::ReadTable),
            Some(CodeRegion::PokeTable) => (&self.poke, CodeRegion::PokeTable),
            Some(CodeRegion::PatchBuffer) | None => return Err(Fault::UnmappedFetch),
        };
        let offset = region
            .descriptor()
            .offset_of(line_addr)
            .ok_or(Fault::UnmappedFetch)?;
        read_line(bytes, offset)
    }
}
