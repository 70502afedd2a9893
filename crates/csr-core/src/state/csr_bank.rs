//! Per-unit control/status register bank.

use std::collections::BTreeMap;

use super::registers::RegisterId;

/// Current mode information.
pub const CSR_CRMD: RegisterId = RegisterId::new(0x0);
/// Pre-exception mode information.
pub const CSR_PRMD: RegisterId = RegisterId::new(0x1);
/// Extended unit enable.
pub const CSR_EUEN: RegisterId = RegisterId::new(0x2);
/// Exception configuration.
pub const CSR_ECFG: RegisterId = RegisterId::new(0x4);
/// Unit identity, read-only.
pub const CSR_CPUID: RegisterId = RegisterId::new(0x20);
/// First of the eight scratch registers (`SAVE0..SAVE7`).
pub const CSR_SAVE0: RegisterId = RegisterId::new(0x30);
/// Timer id.
pub const CSR_TID: RegisterId = RegisterId::new(0x40);

/// Static description of one implemented register.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterSpec {
    /// Register number.
    pub id: RegisterId,
    /// Mnemonic used in logs.
    pub name: String,
    /// Value after reset.
    pub reset: u64,
    /// Bits software can change; the others are hardwired.
    pub writable: u64,
    /// Reset value is replaced by the owning unit's index.
    #[cfg_attr(feature = "serde", serde(default))]
    pub unit_indexed: bool,
}

impl RegisterSpec {
    /// Describes a register with the given reset value and writable bits.
    #[must_use]
    pub fn new(id: RegisterId, name: &str, reset: u64, writable: u64) -> Self {
        Self {
            id,
            name: name.to_owned(),
            reset,
            writable,
            unit_indexed: false,
        }
    }

    /// Describes a read-only register that reads as the unit index.
    #[must_use]
    pub fn unit_indexed(id: RegisterId, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            reset: 0,
            writable: 0,
            unit_indexed: true,
        }
    }
}

/// Register map used when no explicit map is configured.
#[must_use]
pub fn default_register_map() -> Vec<RegisterSpec> {
    let mut map = vec![
        RegisterSpec::new(CSR_CRMD, "CRMD", 0x8, 0x1FF),
        RegisterSpec::new(CSR_PRMD, "PRMD", 0x0, 0x7),
        RegisterSpec::new(CSR_EUEN, "EUEN", 0x0, 0xF),
        RegisterSpec::new(CSR_ECFG, "ECFG", 0x0, 0x0007_1BFF),
        RegisterSpec::unit_indexed(CSR_CPUID, "CPUID"),
        RegisterSpec::new(CSR_TID, "TID", 0x0, 0xFFFF_FFFF),
    ];
    map.extend((0..8_u16).map(|n| {
        RegisterSpec::new(
            RegisterId::new(CSR_SAVE0.get() + n),
            &format!("SAVE{n}"),
            0,
            u64::MAX,
        )
    }));
    map
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    value: u64,
    writable: u64,
}

/// Register contents of one unit.
///
/// Unimplemented ids read as zero and discard writes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CsrBank {
    cells: BTreeMap<RegisterId, Cell>,
}

impl CsrBank {
    /// Builds the bank of unit `unit` from a register map.
    #[must_use]
    pub fn new(map: &[RegisterSpec], unit: usize) -> Self {
        let cells = map
            .iter()
            .map(|spec| {
                let value = if spec.unit_indexed {
                    unit as u64
                } else {
                    spec.reset
                };
                (
                    spec.id,
                    Cell {
                        value,
                        writable: spec.writable,
                    },
                )
            })
            .collect();
        Self { cells }
    }

    /// Returns `true` when `id` is backed by a register.
    #[must_use]
    pub fn is_implemented(&self, id: RegisterId) -> bool {
        self.cells.contains_key(&id)
    }

    /// Reads a register.
    #[must_use]
    pub fn read(&self, id: RegisterId) -> u64 {
        self.cells.get(&id).map_or(0, |cell| cell.value)
    }

    /// Full-width write; returns the previous content.
    pub fn write(&mut self, id: RegisterId, value: u64) -> u64 {
        self.exchange(id, value, u64::MAX)
    }

    /// Masked exchange; returns the previous content.
    ///
    /// Bits selected by `mask` take their value from `value`, all other bits
    /// keep their content. Hardwired bits never change.
    pub fn exchange(&mut self, id: RegisterId, value: u64, mask: u64) -> u64 {
        let Some(cell) = self.cells.get_mut(&id) else {
            return 0;
        };
        let old = cell.value;
        let select = mask & cell.writable;
        cell.value = (old & !select) | (value & select);
        old
    }
}
