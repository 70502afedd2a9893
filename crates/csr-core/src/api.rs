//! Public host-facing configuration, operation and trace types.

use crate::state::{default_register_map, RegisterSpec};
use crate::RegisterId;

/// Number of simulated units when none is configured.
pub const DEFAULT_UNIT_COUNT: usize = 4;

/// How single-unit `read`/`poke` requests turn a register id into code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DispatchStrategy {
    /// Precomputed fragment table indexed by id.
    #[default]
    Table,
    /// Native routine taking the id as an argument.
    Direct,
}

/// Kind of register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessKind {
    /// Side-effect-free read.
    Read,
    /// Exchange-and-restore with a mask.
    Poke,
}

/// One register access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessOp {
    /// Read the register.
    Read(RegisterId),
    /// Poke the register with a mask.
    Poke(RegisterId, u64),
}

impl AccessOp {
    /// Kind of this access.
    #[must_use]
    pub const fn kind(self) -> AccessKind {
        match self {
            Self::Read(_) => AccessKind::Read,
            Self::Poke(..) => AccessKind::Poke,
        }
    }

    /// Register targeted by this access.
    #[must_use]
    pub const fn id(self) -> RegisterId {
        match self {
            Self::Read(id) | Self::Poke(id, _) => id,
        }
    }

    /// Argument passed in `$a0`: the mask for pokes, zero for reads.
    #[must_use]
    pub const fn arg(self) -> u64 {
        match self {
            Self::Read(_) => 0,
            Self::Poke(_, mask) => mask,
        }
    }
}

/// Top-level configuration for a probe instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProbeConfig {
    /// Number of simulated execution units.
    pub units: usize,
    /// Poke mask at start-up.
    pub initial_mask: u64,
    /// Dispatch used by per-id access nodes.
    pub dispatch: DispatchStrategy,
    /// Registers implemented by every unit.
    pub registers: Vec<RegisterSpec>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            units: DEFAULT_UNIT_COUNT,
            initial_mask: 0,
            dispatch: DispatchStrategy::Table,
            registers: default_register_map(),
        }
    }
}

/// Trace events emitted by the access paths when a sink is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// Serialized section entered; `unit` is the task's unit at entry.
    CriticalEnter {
        /// Unit the task was on.
        unit: usize,
    },
    /// Serialized section left; `unit` is the task's unit at exit.
    CriticalExit {
        /// Unit the task was on.
        unit: usize,
    },
    /// One fragment instruction retired.
    InstructionRetired {
        /// Executing unit.
        unit: usize,
        /// Address of the instruction.
        pc: u64,
        /// Raw instruction word.
        word: u32,
    },
    /// Broadcast dispatch-and-collect window opened.
    WindowOpen {
        /// Broadcast operation.
        op: AccessOp,
    },
    /// Broadcast dispatch-and-collect window closed.
    WindowClose {
        /// Broadcast operation.
        op: AccessOp,
    },
    /// Patch buffer now targets `id`.
    Retargeted {
        /// New target.
        id: RegisterId,
    },
}

/// Sink for trace hooks; called from every unit concurrently.
pub trait TraceSink: Send + Sync {
    /// Records an event.
    fn on_event(&self, event: TraceEvent);
}
