//! Architectural unit state model primitives.

/// Per-unit control/status register bank and register maps.
pub mod csr_bank;
/// Register numbering and general-purpose register file.
pub mod registers;

pub use csr_bank::{
    default_register_map, CsrBank, RegisterSpec, CSR_CPUID, CSR_CRMD, CSR_ECFG, CSR_EUEN,
    CSR_PRMD, CSR_SAVE0, CSR_TID,
};
pub use registers::{
    GeneralRegisters, RegisterId, GENERAL_REGISTER_COUNT, GPR_A0, GPR_RA, GPR_ZERO,
    REGISTER_ID_BITS, REGISTER_ID_COUNT, REGISTER_ID_MASK,
};

use crate::icache::InstructionCache;

/// Architectural state owned by one execution unit.
#[derive(Debug, Clone)]
pub struct UnitState {
    /// Index of the owning unit.
    pub index: usize,
    /// General-purpose registers.
    pub gpr: GeneralRegisters,
    /// Control/status registers.
    pub csr: CsrBank,
    /// Instruction cache.
    pub icache: InstructionCache,
}

impl UnitState {
    /// Creates reset state for unit `index`.
    #[must_use]
    pub fn new(index: usize, map: &[RegisterSpec]) -> Self {
        Self {
            index,
            gpr: GeneralRegisters::default(),
            csr: CsrBank::new(map, index),
            icache: InstructionCache::default(),
        }
    }
}
