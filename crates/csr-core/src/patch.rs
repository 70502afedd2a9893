//! Reusable patch buffer.
//!
//! One executable page holds the read and poke fragments of the currently
//! selected register. Retargeting rewrites the fragments in place under the
//! writer side of a reader/writer lock; invocations hold the reader side
//! for the whole fragment run, so a half-written stream is never fetched.

use std::ops::Range;
use std::sync::Arc;

use log::{debug, warn};
use spin::{RwLock, RwLockReadGuard};

use crate::codegen::{poke_fragment, read_fragment};
use crate::encoding::{write_words, TRAP_WORD};
use crate::icache::{read_line, CodeSource, ICACHE_LINE_WORDS};
use crate::memory::{
    new_region_backing, CodeRegion, PageProtector, Protection, PATCH_BUFFER_BYTES,
    PATCH_POKE_ENTRY, PATCH_READ_ENTRY, POKE_SLOT_BYTES, READ_SLOT_BYTES,
};
use crate::{AccessKind, Fault, ProbeError, RegisterId, TraceEvent, TraceSink};

/// Bytes rewritten by a retarget: read fragment, padding, poke fragment.
pub const PATCH_IMAGE_BYTES: usize = 0x10 + POKE_SLOT_BYTES;

/// Contents and protection state of the patch page.
pub struct PatchRegion {
    bytes: Box<[u8]>,
    protection: Protection,
    target: Option<RegisterId>,
}

impl PatchRegion {
    /// Register the fragments currently target, `None` while trap-filled.
    #[must_use]
    pub const fn target(&self) -> Option<RegisterId> {
        self.target
    }

    /// Current protection of the page.
    #[must_use]
    pub const fn protection(&self) -> Protection {
        self.protection
    }

    /// Entry point of the `kind` fragment.
    #[must_use]
    pub const fn entry(kind: AccessKind) -> u64 {
        match kind {
            AccessKind::Read => PATCH_READ_ENTRY,
            AccessKind::Poke => PATCH_POKE_ENTRY,
        }
    }

    /// Raw bytes of the rewritten image.
    #[must_use]
    pub fn image(&self) -> &[u8] {
        &self.bytes[..PATCH_IMAGE_BYTES]
    }
}

impl CodeSource for PatchRegion {
    fn check_fetch(&self, addr: u64) -> Result<(), Fault> {
        if !CodeRegion::PatchBuffer.descriptor().contains(addr) {
            return Err(Fault::UnmappedFetch);
        }
        if !self.protection.is_executable() {
            return Err(Fault::NonExecutableFetch);
        }
        Ok(())
    }

    fn load_line(&self, line_addr: u64) -> Result<[u32; ICACHE_LINE_WORDS], Fault> {
        let offset = CodeRegion::PatchBuffer
            .descriptor()
            .offset_of(line_addr)
            .ok_or(Fault::UnmappedFetch)?;
        read_line(&self.bytes, offset)
    }
}

/// Single reusable code buffer retargeted on demand.
pub struct PatchBuffer {
    region: RwLock<PatchRegion>,
    protector: Arc<dyn PageProtector>,
}

impl std::fmt::Debug for PatchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let region = self.region.read();
        f.debug_struct("PatchBuffer")
            .field("target", &region.target)
            .field("protection", &region.protection)
            .finish_non_exhaustive()
    }
}

fn build_image(id: RegisterId) -> [u8; PATCH_IMAGE_BYTES] {
    let mut image = [0_u8; PATCH_IMAGE_BYTES];
    write_words(&mut image, &[TRAP_WORD; PATCH_IMAGE_BYTES / 4]);
    write_words(&mut image[..READ_SLOT_BYTES], &read_fragment(id));
    write_words(&mut image[0x10..], &poke_fragment(id));
    image
}

impl PatchBuffer {
    /// Allocates the page, fills it with trap instructions and seals it.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::OutOfMemory`] or [`ProbeError::Protection`].
    pub fn new(protector: Arc<dyn PageProtector>) -> Result<Self, ProbeError> {
        let mut bytes = new_region_backing(PATCH_BUFFER_BYTES)?;
        write_words(&mut bytes, &vec![TRAP_WORD; PATCH_BUFFER_BYTES / 4]);

        let descriptor = CodeRegion::PatchBuffer.descriptor();
        if !protector.set_protection(descriptor, Protection::ExecOnly) {
            return Err(ProbeError::Protection {
                addr: descriptor.base,
                to: Protection::ExecOnly,
            });
        }

        Ok(Self {
            region: RwLock::new(PatchRegion {
                bytes,
                protection: Protection::ExecOnly,
                target: None,
            }),
            protector,
        })
    }

    /// Rewrites the fragments to target `id`.
    ///
    /// `invalidate` is called with the rewritten range before invocations
    /// are let back in; it must make every unit drop stale cache lines.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Protection`] when a transition fails. If making
    /// the page writable fails nothing has changed; if sealing it again
    /// fails the old bytes are put back and the page stays non-executable,
    /// so invocations fault instead of running a mixed stream.
    pub fn retarget(
        &self,
        id: RegisterId,
        invalidate: &dyn Fn(Range<u64>),
        trace: Option<&dyn TraceSink>,
    ) -> Result<(), ProbeError> {
        let image = build_image(id);
        let descriptor = CodeRegion::PatchBuffer.descriptor();
        let mut region = self.region.write();

        if !self
            .protector
            .set_protection(descriptor, Protection::Writable)
        {
            return Err(ProbeError::Protection {
                addr: descriptor.base,
                to: Protection::Writable,
            });
        }
        region.protection = Protection::Writable;

        let mut previous = [0_u8; PATCH_IMAGE_BYTES];
        previous.copy_from_slice(&region.bytes[..PATCH_IMAGE_BYTES]);
        region.bytes[..PATCH_IMAGE_BYTES].copy_from_slice(&image);

        if !self
            .protector
            .set_protection(descriptor, Protection::ExecOnly)
        {
            region.bytes[..PATCH_IMAGE_BYTES].copy_from_slice(&previous);
            warn!("patch buffer could not be sealed for csr {id}; rewrite rolled back");
            return Err(ProbeError::Protection {
                addr: descriptor.base,
                to: Protection::ExecOnly,
            });
        }
        region.protection = Protection::ExecOnly;
        region.target = Some(id);

        invalidate(descriptor.base..descriptor.base + PATCH_IMAGE_BYTES as u64);
        debug!("patch buffer retargeted to csr {id}");
        if let Some(sink) = trace {
            sink.on_event(TraceEvent::Retargeted { id });
        }
        Ok(())
    }

    /// Takes the reader side for the duration of one invocation.
    pub fn read(&self) -> RwLockReadGuard<'_, PatchRegion> {
        self.region.read()
    }

    /// Register the buffer currently targets.
    #[must_use]
    pub fn target(&self) -> Option<RegisterId> {
        self.region.read().target
    }
}
