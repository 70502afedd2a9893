use thiserror::Error;

use crate::memory::Protection;

/// Fault classes used for trace aggregation and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Decoder rejected an instruction encoding.
    Decode,
    /// Instruction fetch policy violation.
    Fetch,
    /// Deliberate trap raised by a `break` instruction.
    Trap,
    /// Fragment did not return within its fixed instruction budget.
    Budget,
}

/// Faults raised while a unit executes an access fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Fault {
    /// Word does not decode to an instruction the fragment ISA accepts.
    #[error("illegal instruction encoding")]
    IllegalInstruction = 0x01,
    /// Fetch from a region that is currently not executable.
    #[error("instruction fetch from non-executable region")]
    NonExecutableFetch = 0x02,
    /// Fetch from an address outside every code region.
    #[error("instruction fetch from unmapped address")]
    UnmappedFetch = 0x03,
    /// Fetch from an address that is not word aligned.
    #[error("unaligned instruction fetch")]
    UnalignedFetch = 0x04,
    /// `break` executed; trap-filled code lands here.
    #[error("breakpoint trap")]
    Breakpoint = 0x05,
    /// Fragment exceeded the fixed instruction budget.
    #[error("fragment exceeded its instruction budget")]
    StepBudgetExceeded = 0x06,
}

impl Fault {
    /// Converts a fault to its stable code.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable code back into a fault.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::IllegalInstruction),
            0x02 => Some(Self::NonExecutableFetch),
            0x03 => Some(Self::UnmappedFetch),
            0x04 => Some(Self::UnalignedFetch),
            0x05 => Some(Self::Breakpoint),
            0x06 => Some(Self::StepBudgetExceeded),
            _ => None,
        }
    }

    /// Returns the class this fault is aggregated under.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::IllegalInstruction => FaultClass::Decode,
            Self::NonExecutableFetch | Self::UnmappedFetch | Self::UnalignedFetch => {
                FaultClass::Fetch
            }
            Self::Breakpoint => FaultClass::Trap,
            Self::StepBudgetExceeded => FaultClass::Budget,
        }
    }
}

/// Errors surfaced by probe construction, configuration and access paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// A code region could not be moved to the requested protection.
    #[error("protection transition of region at {addr:#x} to {to:?} failed")]
    Protection {
        /// Base address of the region.
        addr: u64,
        /// Protection that was requested.
        to: Protection,
    },
    /// Backing storage for code regions or result slots could not be allocated.
    #[error("failed to allocate {bytes} bytes")]
    OutOfMemory {
        /// Requested allocation size.
        bytes: usize,
    },
    /// A unit faulted while executing an access fragment.
    #[error("unit {unit} faulted: {fault}")]
    Execution {
        /// Index of the faulting unit.
        unit: usize,
        /// Fault raised by the fragment.
        fault: Fault,
    },
    /// The calling task is bound to a unit that is not active.
    #[error("unit {0} is not active")]
    InactiveUnit(usize),
    /// The configuration asks for a machine without units.
    #[error("at least one unit is required")]
    NoUnits,
    /// The unit index does not exist on this machine.
    #[error("unit {0} does not exist")]
    UnknownUnit(usize),
    /// The task has migration disabled and cannot be moved.
    #[error("task is pinned to unit {0}")]
    Pinned(usize),
    /// A unit worker thread could not be started.
    #[error("failed to start worker for unit {0}")]
    Spawn(usize),
    /// A unit worker went away while a broadcast was in flight.
    #[error("worker for unit {0} is gone")]
    WorkerGone(usize),
}
