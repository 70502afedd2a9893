/// Width in bits of a control/status register number.
pub const REGISTER_ID_BITS: u32 = 14;
/// Mask applied to every raw register number.
pub const REGISTER_ID_MASK: u16 = (1 << REGISTER_ID_BITS) - 1;
/// Number of addressable register ids (`0..=16383`).
pub const REGISTER_ID_COUNT: usize = 1 << REGISTER_ID_BITS;

/// Number of general-purpose registers in a unit (`r0..r31`).
pub const GENERAL_REGISTER_COUNT: usize = 32;
/// `$zero`, hardwired to zero.
pub const GPR_ZERO: u8 = 0;
/// `$ra`, return address.
pub const GPR_RA: u8 = 1;
/// `$a0`, first argument and return value.
pub const GPR_A0: u8 = 4;

/// Control/status register number.
///
/// Construction masks the raw value to 14 bits and performs no other
/// validation: ids outside the implemented set are passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(from = "u16", into = "u16"))]
pub struct RegisterId(u16);

impl RegisterId {
    /// Largest register id.
    pub const MAX: Self = Self(REGISTER_ID_MASK);

    /// Creates a register id from a raw number, keeping the low 14 bits.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw & REGISTER_ID_MASK)
    }

    /// Returns the raw 14-bit number.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Returns the id as a table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterates over every addressable id in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..=REGISTER_ID_MASK).map(Self)
    }
}

impl From<u16> for RegisterId {
    fn from(raw: u16) -> Self {
        Self::new(raw)
    }
}

impl From<RegisterId> for u16 {
    fn from(id: RegisterId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RegisterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// General-purpose register file of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralRegisters {
    gpr: [u64; GENERAL_REGISTER_COUNT],
}

impl Default for GeneralRegisters {
    fn default() -> Self {
        Self {
            gpr: [0; GENERAL_REGISTER_COUNT],
        }
    }
}

impl GeneralRegisters {
    /// Reads register `r`; `r0` always reads zero.
    #[must_use]
    pub const fn get(&self, r: u8) -> u64 {
        if r == GPR_ZERO {
            0
        } else {
            self.gpr[(r as usize) % GENERAL_REGISTER_COUNT]
        }
    }

    /// Writes register `r`; writes to `r0` are discarded.
    pub const fn set(&mut self, r: u8, value: u64) {
        if r != GPR_ZERO {
            self.gpr[(r as usize) % GENERAL_REGISTER_COUNT] = value;
        }
    }
}
