//! Code address space: fixed region map and protection policy.

/// Fixed code-region map and address decoder.
pub mod map;
/// Region protection states and the transition hook.
pub mod protection;

pub use map::{
    decode_code_region, CodeRegion, RegionDescriptor, CODE_REGIONS, PATCH_BUFFER_BASE,
    PATCH_BUFFER_BYTES, PATCH_POKE_ENTRY, PATCH_READ_ENTRY, POKE_SLOT_BYTES, POKE_TABLE_BASE,
    POKE_TABLE_BYTES, READ_SLOT_BYTES, READ_TABLE_BASE, READ_TABLE_BYTES, RETURN_ADDRESS,
};
pub use protection::{AlwaysGrant, PageProtector, Protection};

use crate::ProbeError;

/// Allocates a zeroed backing store for a code region.
///
/// # Errors
///
/// Returns [`ProbeError::OutOfMemory`] when the allocation cannot be served.
pub fn new_region_backing(len: usize) -> Result<Box<[u8]>, ProbeError> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len)
        .map_err(|_| ProbeError::OutOfMemory { bytes: len })?;
    bytes.resize(len, 0);
    Ok(bytes.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::{new_region_backing, ProbeError, READ_TABLE_BYTES};

    #[test]
    fn backing_store_is_zeroed_and_sized() {
        let memory = new_region_backing(READ_TABLE_BYTES).expect("allocation");
        assert_eq!(memory.len(), READ_TABLE_BYTES);
        assert!(memory.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn impossible_allocation_is_reported() {
        assert_eq!(
            new_region_backing(usize::MAX),
            Err(ProbeError::OutOfMemory { bytes: usize::MAX })
        );
    }
}
